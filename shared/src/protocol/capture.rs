//! Capture file format for raw query results.
//!
//! A capture bundles the raw result buffer read back after all passes of a
//! query with the request that produced it, so results can be reduced later
//! or on another machine. Uses bincode with an explicit config (fixint for
//! lengths and enums) so writers and readers always agree on the encoding.

use anyhow::{Context, Result};
use bincode::Options;
use std::path::Path;

/// Capture format version
pub const CAPTURE_VERSION: u32 = 1;

/// Magic prefix of capture files
pub const CAPTURE_MAGIC: [u8; 4] = *b"TLYC";

fn capture_bincode() -> impl bincode::config::Options {
    bincode::config::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Raw result buffer plus the request that produced it
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Capture {
    pub magic: [u8; 4],
    pub version: u32,

    /// Requested catalog indices, in request order
    pub metric_indices: Vec<u32>,

    /// Pass count of the pool at capture time
    pub pass_count: u32,

    /// Byte stride of one query slot
    pub stride: u32,

    /// Raw 64-bit words of one query slot
    pub data: Vec<u64>,
}

impl Capture {
    /// Create a new capture
    pub fn new(metric_indices: Vec<u32>, pass_count: u32, stride: u32, data: Vec<u64>) -> Self {
        Self {
            magic: CAPTURE_MAGIC,
            version: CAPTURE_VERSION,
            metric_indices,
            pass_count,
            stride,
            data,
        }
    }

    /// Serialize capture to bytes (bincode, fixint encoding).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        capture_bincode().serialize(self).map_err(Into::into)
    }

    /// Deserialize a capture, validating magic, version and data length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let capture: Self = capture_bincode()
            .deserialize(bytes)
            .context("failed to decode capture")?;

        if capture.magic != CAPTURE_MAGIC {
            anyhow::bail!("not a capture file (bad magic)");
        }
        if capture.version != CAPTURE_VERSION {
            anyhow::bail!(
                "unsupported capture version {} (expected {})",
                capture.version,
                CAPTURE_VERSION
            );
        }
        if (capture.data.len() as u64) * 8 < capture.stride as u64 {
            anyhow::bail!(
                "capture holds {} bytes but stride is {}",
                capture.data.len() * 8,
                capture.stride
            );
        }
        Ok(capture)
    }

    /// Write the capture to a file
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write capture: {}", path.display()))
    }

    /// Read a capture from a file
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read capture: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let capture = Capture::new(vec![0, 3, 3], 2, 48, vec![1, 2, 3, 4, 1, 1]);
        let bytes = capture.to_bytes().unwrap();
        let decoded = Capture::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, capture);
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut capture = Capture::new(vec![0], 1, 8, vec![0]);
        capture.version = 99;
        let bytes = capture_bincode().serialize(&capture).unwrap();
        let err = Capture::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported capture version"));
    }

    #[test]
    fn test_short_data_rejected() {
        let capture = Capture::new(vec![0], 1, 64, vec![0, 0]);
        let bytes = capture_bincode().serialize(&capture).unwrap();
        assert!(Capture::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_garbage_bytes_fail() {
        let bytes = vec![0xFF; 20];
        assert!(Capture::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.tlyc");
        let capture = Capture::new(vec![5], 1, 24, vec![10, 20, 1]);
        capture.write_to(&path).unwrap();
        assert_eq!(Capture::read_from(&path).unwrap(), capture);
    }
}
