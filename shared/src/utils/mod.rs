//! Utility functions and helpers

use anyhow::{Context, Result};

/// Convert bytes to a hexadecimal string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Longest range `parse_index_list` expands
pub const MAX_INDEX_RANGE: u32 = 4096;

/// Parse a list of metric indices (e.g., "0,3,5-7").
///
/// Order and duplicates are preserved; ranges are inclusive and at most
/// [`MAX_INDEX_RANGE`] long.
pub fn parse_index_list(s: &str) -> Result<Vec<u32>> {
    let mut indices = Vec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo
                .trim()
                .parse()
                .with_context(|| format!("Invalid range start: {}", part))?;
            let hi: u32 = hi
                .trim()
                .parse()
                .with_context(|| format!("Invalid range end: {}", part))?;
            if hi < lo {
                anyhow::bail!("Empty range: {}", part);
            }
            if hi - lo >= MAX_INDEX_RANGE {
                anyhow::bail!("Range too long: {} (at most {} indices)", part, MAX_INDEX_RANGE);
            }
            indices.extend(lo..=hi);
        } else {
            let idx: u32 = part
                .parse()
                .with_context(|| format!("Invalid metric index: {}", part))?;
            indices.push(idx);
        }
    }

    if indices.is_empty() {
        anyhow::bail!("No metric indices given");
    }
    Ok(indices)
}

/// Parse a GPU address given in decimal or `0x`-prefixed hex
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("Invalid address: {}", s))
}
