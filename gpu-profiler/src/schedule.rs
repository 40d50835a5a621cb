//! Pass scheduling and result buffer layout
//!
//! A block can only sample `num_counters` registers at once. When a query
//! needs more registers on one block, the workload is replayed and each replay
//! (pass) selects a different slice of that block's registers: pass `p` takes
//! the block's registers `p * capacity .. (p + 1) * capacity` in sorted order.
//!
//! Result buffer layout for one query slot:
//!
//! ```text
//! per register, per instance: [begin: u64][end: u64]
//! per pass:                   [completion flag: u64]
//! ```

use crate::alloc::{BlockRun, RegisterSet};
use crate::error::{Error, Result};
use crate::hw::HwCaps;
use crate::metrics::CounterReg;

/// Bytes of one begin/end counter pair
pub const COUNTER_PAIR_BYTES: u32 = 16;

/// Placement of one register in the result buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSlot {
    pub reg: CounterReg,

    /// Byte offset of the first instance's begin value
    pub offset: u32,

    /// Number of instances read for this register
    pub instances: u32,
}

/// Register run of one block together with its scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRun {
    pub run: BlockRun,

    /// Registers the block samples per pass
    pub capacity: u32,

    /// Passes this block needs on its own
    pub passes: u32,
}

/// Pass count and buffer layout of a query pool. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSchedule {
    pass_count: u32,
    slots: Vec<RegisterSlot>,
    runs: Vec<ScheduledRun>,
    data_size: u32,
}

/// Passes needed to sample `set` on a device
pub fn passes_needed(set: &RegisterSet, caps: &HwCaps) -> u32 {
    set.block_runs()
        .iter()
        .map(|run| block_passes(run.len, caps.capacity(run.block)))
        .fold(1, u32::max)
}

fn block_passes(len: usize, capacity: u32) -> u32 {
    debug_assert!(capacity > 0, "block without counters in register set");
    (len as u32).div_ceil(capacity.max(1))
}

impl PassSchedule {
    /// Compute pass count and byte offsets for a register set.
    ///
    /// Fails with [`Error::OutOfMemory`] if the slot layout does not fit the
    /// 32-bit offset space.
    pub fn plan(set: &RegisterSet, caps: &HwCaps) -> Result<Self> {
        let block_runs = set.block_runs();

        let mut runs = Vec::new();
        runs.try_reserve_exact(block_runs.len())?;
        runs.extend(block_runs.into_iter().map(|run| {
            let capacity = caps.capacity(run.block);
            ScheduledRun {
                run,
                capacity,
                passes: block_passes(run.len, capacity),
            }
        }));
        let pass_count = runs.iter().map(|r| r.passes).fold(1, u32::max);

        let mut slots = Vec::new();
        slots.try_reserve_exact(set.len())?;
        let mut offset = 0u32;
        for reg in set.registers() {
            let instances = caps.instance_count(reg.block);
            slots.push(RegisterSlot {
                reg: *reg,
                offset,
                instances,
            });
            offset = COUNTER_PAIR_BYTES
                .checked_mul(instances)
                .and_then(|bytes| offset.checked_add(bytes))
                .ok_or(Error::OutOfMemory)?;
        }
        pass_count
            .checked_mul(8)
            .and_then(|flags| offset.checked_add(flags))
            .ok_or(Error::OutOfMemory)?;

        Ok(Self {
            pass_count,
            slots,
            runs,
            data_size: offset,
        })
    }

    /// Number of replays needed to sample every register (at least 1)
    pub fn pass_count(&self) -> u32 {
        self.pass_count
    }

    /// Register placements, in sorted register order
    pub fn slots(&self) -> &[RegisterSlot] {
        &self.slots
    }

    pub fn runs(&self) -> &[ScheduledRun] {
        &self.runs
    }

    /// Bytes used by counter pairs, excluding completion flags
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// Bytes of one query slot: counter pairs plus one flag per pass
    pub fn stride(&self) -> u32 {
        self.data_size + 8 * self.pass_count
    }

    /// Byte offset of a pass's completion flag
    pub fn completion_flag_offset(&self, pass: u32) -> u32 {
        self.data_size + 8 * pass
    }

    /// Slot of a register, if it is part of this schedule
    pub fn slot_of(&self, reg: &CounterReg) -> Option<&RegisterSlot> {
        self.slots
            .binary_search_by(|s| s.reg.cmp(reg))
            .ok()
            .map(|i| &self.slots[i])
    }

    /// Registers of `run` sampled during `pass`
    pub fn pass_slice(&self, run: &ScheduledRun, pass: u32) -> &[RegisterSlot] {
        let skip = (run.capacity * pass) as usize;
        if skip >= run.run.len {
            return &[];
        }
        let take = (run.run.len - skip).min(run.capacity as usize);
        let start = run.run.start + skip;
        &self.slots[start..start + take]
    }

    /// Pass during which a register is sampled
    pub fn pass_of(&self, reg: &CounterReg) -> Option<u32> {
        let run = self.runs.iter().find(|r| r.run.block == reg.block)?;
        let index = self.slots.binary_search_by(|s| s.reg.cmp(reg)).ok()?;
        Some(((index - run.run.start) as u32) / run.capacity)
    }
}
