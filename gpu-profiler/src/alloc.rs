//! Register allocation
//!
//! Resolves requested metrics to the set of physical counter registers they
//! read. Constants never occupy hardware state and are left out.

use crate::catalog::MetricCatalog;
use crate::error::Result;
use crate::hw::BlockId;
use crate::metrics::{CounterReg, MAX_OPERANDS};

/// Contiguous run of registers belonging to one block in a sorted register list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRun {
    pub block: BlockId,
    pub start: usize,
    pub len: usize,
}

/// Sorted, deduplicated registers read by a set of requested metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet {
    registers: Vec<CounterReg>,
}

impl RegisterSet {
    /// Collect the registers of every requested metric.
    ///
    /// Every index must be below `catalog.len()`. Duplicate requests are allowed.
    pub fn collect(catalog: &MetricCatalog, metric_indices: &[u32]) -> Result<Self> {
        let mut registers = Vec::new();
        registers.try_reserve(metric_indices.len() * MAX_OPERANDS)?;

        for &index in metric_indices {
            debug_assert!(
                (index as usize) < catalog.len(),
                "metric index {} out of range ({} metrics)",
                index,
                catalog.len()
            );
            if let Some(desc) = catalog.get(index) {
                registers.extend(desc.registers());
            }
        }

        Ok(Self::from_registers(registers))
    }

    /// Build a set from an arbitrary register list
    pub fn from_registers(mut registers: Vec<CounterReg>) -> Self {
        registers.sort_unstable();
        registers.dedup();
        Self { registers }
    }

    pub fn registers(&self) -> &[CounterReg] {
        &self.registers
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Position of a register in the sorted list
    pub fn position(&self, reg: &CounterReg) -> Option<usize> {
        self.registers.binary_search(reg).ok()
    }

    /// Split the list into per-block runs, in block order
    pub fn block_runs(&self) -> Vec<BlockRun> {
        let mut runs: Vec<BlockRun> = Vec::new();
        for (i, reg) in self.registers.iter().enumerate() {
            match runs.last_mut() {
                Some(run) if run.block == reg.block => run.len += 1,
                _ => runs.push(BlockRun {
                    block: reg.block,
                    start: i,
                    len: 1,
                }),
            }
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{GfxLevel, HwCaps};

    fn catalog() -> MetricCatalog {
        MetricCatalog::build(&HwCaps::preset(GfxLevel::Gfx10_3, 2, 20)).unwrap()
    }

    #[test]
    fn test_shared_registers_dedup() {
        let catalog = catalog();
        // VALU Busy, SALU Busy and GPU active cycles all read GRBM GUI_ACTIVE
        let set = RegisterSet::collect(&catalog, &[0, 10, 11]).unwrap();
        let grbm = set
            .registers()
            .iter()
            .filter(|r| r.block == BlockId::Grbm)
            .count();
        assert_eq!(grbm, 1);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_every_register_present_once() {
        let catalog = catalog();
        let request = [12, 13, 16, 12, 3, 14];
        let set = RegisterSet::collect(&catalog, &request).unwrap();

        for &idx in &request {
            for reg in catalog.get(idx).unwrap().registers() {
                let hits = set.registers().iter().filter(|r| **r == reg).count();
                assert_eq!(hits, 1, "{:?}", reg);
            }
        }
        assert!(set.registers().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_constants_not_allocated() {
        let catalog = catalog();
        // VRAM write size: two registers, six constants
        let set = RegisterSet::collect(&catalog, &[13]).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_block_runs() {
        let set = RegisterSet::from_registers(vec![
            CounterReg::new(BlockId::Tcp, 9),
            CounterReg::new(BlockId::Grbm, 2),
            CounterReg::new(BlockId::Tcp, 1),
            CounterReg::new(BlockId::Tcp, 9),
            CounterReg::new(BlockId::Gl2c, 3),
        ]);
        let runs = set.block_runs();
        assert_eq!(
            runs,
            vec![
                BlockRun { block: BlockId::Grbm, start: 0, len: 1 },
                BlockRun { block: BlockId::Tcp, start: 1, len: 2 },
                BlockRun { block: BlockId::Gl2c, start: 3, len: 1 },
            ]
        );
        assert_eq!(set.position(&CounterReg::new(BlockId::Tcp, 9)), Some(2));
        assert_eq!(set.position(&CounterReg::new(BlockId::Sq, 9)), None);
    }

    #[test]
    fn test_empty_request() {
        let set = RegisterSet::collect(&catalog(), &[]).unwrap();
        assert!(set.is_empty());
        assert!(set.block_runs().is_empty());
    }
}
