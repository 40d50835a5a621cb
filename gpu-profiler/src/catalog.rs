//! Metric catalog
//!
//! Built once per device from its capability table and shared by every query
//! pool created on that device.

use crate::error::{Error, Result};
use crate::hw::{GfxLevel, HwCaps};
use crate::metrics::{define_metrics, metric_count, MetricDescriptor, REQUIRED_BLOCKS};
use tally_shared::utils::bytes_to_hex;
use tally_shared::MetricInfo;
use tracing::{debug, warn};

/// Outcome of [`MetricCatalog::enumerate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Enumeration<'a> {
    /// No capacity was given; only the total count is reported
    Count(usize),
    /// All descriptors fit
    Complete(&'a [MetricDescriptor]),
    /// The capacity was smaller than the catalog; the first `capacity` descriptors
    Incomplete(&'a [MetricDescriptor]),
}

/// Static table of metric descriptors for one device
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    gfx_level: GfxLevel,
    descriptors: Vec<MetricDescriptor>,
}

impl MetricCatalog {
    /// Build the catalog for a device.
    ///
    /// Fails with [`Error::HardwareCapabilityUnavailable`] if the device
    /// reports no counter blocks, lacks one the metrics read, or describes a
    /// block that [`HwCaps::validate`] rejects.
    pub fn build(caps: &HwCaps) -> Result<Self> {
        if caps.blocks.is_empty() {
            warn!("No counter blocks reported for {}", caps.gfx_level);
            return Err(Error::HardwareCapabilityUnavailable);
        }
        if let Err(e) = caps.validate() {
            warn!("Rejecting capability table for {}: {}", caps.gfx_level, e);
            return Err(Error::HardwareCapabilityUnavailable);
        }
        if let Some(missing) = REQUIRED_BLOCKS.iter().find(|b| caps.capacity(**b) == 0) {
            warn!("Counter block {} unavailable on {}", missing, caps.gfx_level);
            return Err(Error::HardwareCapabilityUnavailable);
        }

        let mut descriptors = Vec::new();
        descriptors.try_reserve_exact(metric_count(caps.gfx_level))?;
        define_metrics(caps, &mut descriptors);

        debug!(
            "Built metric catalog: {} metrics for {}",
            descriptors.len(),
            caps.gfx_level
        );

        Ok(Self {
            gfx_level: caps.gfx_level,
            descriptors,
        })
    }

    pub fn gfx_level(&self) -> GfxLevel {
        self.gfx_level
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&MetricDescriptor> {
        self.descriptors.get(index as usize)
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    /// Index of the metric with the given name
    pub fn find(&self, name: &str) -> Option<u32> {
        self.descriptors
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }

    /// Enumerate descriptors into a caller buffer of `capacity` entries.
    ///
    /// With no capacity only the count is returned, so callers can size their
    /// buffer first.
    pub fn enumerate(&self, capacity: Option<usize>) -> Enumeration<'_> {
        match capacity {
            None => Enumeration::Count(self.descriptors.len()),
            Some(cap) if cap >= self.descriptors.len() => {
                Enumeration::Complete(&self.descriptors)
            }
            Some(cap) => Enumeration::Incomplete(&self.descriptors[..cap]),
        }
    }

    /// Public descriptions of every metric, in index order
    pub fn infos(&self) -> Result<Vec<MetricInfo>> {
        let mut infos = Vec::new();
        infos.try_reserve_exact(self.descriptors.len())?;
        infos.extend(self.descriptors.iter().enumerate().map(|(i, d)| MetricInfo {
            index: i as u32,
            name: d.name.to_string(),
            category: d.category.to_string(),
            description: d.description.to_string(),
            unit: d.unit,
            uuid: bytes_to_hex(&d.stable_id.uuid()),
        }));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::BlockId;
    use tally_shared::Unit;

    fn caps() -> HwCaps {
        HwCaps::preset(GfxLevel::Gfx10_3, 4, 40)
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = MetricCatalog::build(&caps()).unwrap();
        let b = MetricCatalog::build(&caps()).unwrap();
        assert_eq!(a.descriptors(), b.descriptors());
        assert_eq!(a.len(), 19);
    }

    #[test]
    fn test_build_without_blocks_fails() {
        let mut caps = caps();
        caps.blocks.clear();
        assert_eq!(
            MetricCatalog::build(&caps).unwrap_err(),
            Error::HardwareCapabilityUnavailable
        );
    }

    #[test]
    fn test_build_with_missing_block_fails() {
        let mut caps = caps();
        caps.blocks.retain(|b| b.id != BlockId::Gl1c);
        assert!(MetricCatalog::build(&caps).is_err());
    }

    #[test]
    fn test_build_rejects_short_select_list() {
        let mut caps = caps();
        let sq = caps.blocks.iter_mut().find(|b| b.id == BlockId::Sq).unwrap();
        sq.select_regs.truncate(1);
        assert_eq!(
            MetricCatalog::build(&caps).unwrap_err(),
            Error::HardwareCapabilityUnavailable
        );
    }

    #[test]
    fn test_enumerate_by_capacity() {
        let catalog = MetricCatalog::build(&caps()).unwrap();
        assert_eq!(catalog.enumerate(None), Enumeration::Count(19));
        match catalog.enumerate(Some(3)) {
            Enumeration::Incomplete(d) => {
                assert_eq!(d.len(), 3);
                assert_eq!(d[0].name, "GPU active cycles");
            }
            other => panic!("expected Incomplete, got {:?}", other),
        }
        match catalog.enumerate(Some(64)) {
            Enumeration::Complete(d) => assert_eq!(d.len(), 19),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_infos() {
        let catalog = MetricCatalog::build(&caps()).unwrap();
        let infos = catalog.infos().unwrap();
        assert_eq!(infos.len(), catalog.len());
        assert_eq!(infos[14].name, "L0 cache hit ratio");
        assert_eq!(infos[14].unit, Unit::Percentage);
        assert_eq!(infos[14].index, 14);
        assert_eq!(infos[0].uuid, "54414c4c595043000000000000000000");
    }

    #[test]
    fn test_find_by_name() {
        let catalog = MetricCatalog::build(&caps()).unwrap();
        assert_eq!(catalog.find("valu busy"), Some(10));
        assert_eq!(catalog.find("nope"), None);
    }
}
