//! CLI subcommands

pub mod emit;
pub mod list;
pub mod plan;
pub mod reduce;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tally_gpu::{Device, MetricCatalog};

use crate::config::DeviceConfig;

/// Build the configured device and its catalog
pub fn open_device(config_path: Option<&Path>) -> Result<(Device, Arc<MetricCatalog>)> {
    let config = DeviceConfig::load(config_path)?;
    let device = config.to_device();
    let catalog = device
        .catalog()
        .with_context(|| format!("No metric catalog for {}", config.gfx_level))?;
    Ok((device, catalog))
}

/// Reject indices the catalog does not define
pub fn check_indices(catalog: &MetricCatalog, indices: &[u32]) -> Result<()> {
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= catalog.len()) {
        anyhow::bail!(
            "Metric index {} out of range ({} metrics available)",
            bad,
            catalog.len()
        );
    }
    Ok(())
}
