//! Begin/End command emission
//!
//! Counter block select state is shared by the whole device, so at most one
//! query's pass-select span may be live at a time. Every replay `p` of an
//! instrumented workload is therefore bracketed by the device's lock stream
//! for `p` and its unlock stream:
//!
//! ```text
//! lock(p):   spin CAS lock 0 -> 1, flag[0] = 0, flag[p] = 1
//! begin:     per pass, if flag[pass]: select that pass's registers; sample begin values
//! workload
//! end:       per pass, if flag[pass]: sample end values, set completion flag
//! unlock(p): flag[p] = 0, flag[0] = 1, lock = 0
//! ```
//!
//! Begin and End emit a conditional span for every pass; only the span whose
//! flag is set executes on a given replay.

use crate::cmdstream::{
    size, CommandStream, EVENT_CS_PARTIAL_FLUSH, EVENT_PERFCOUNTER_SAMPLE,
    EVENT_PERFCOUNTER_START, EVENT_PERFCOUNTER_STOP,
};
use crate::device::SideBuffer;
use crate::error::Result;
use crate::hw::{BlockCaps, HwCaps};
use crate::schedule::{PassSchedule, RegisterSlot, ScheduledRun, COUNTER_PAIR_BYTES};
use tracing::debug;

pub const GRBM_GFX_INDEX: u32 = 0x30800;
pub const CP_PERFMON_CNTL: u32 = 0x36020;
pub const SQ_PERFCOUNTER_CTRL: u32 = 0x36780;
pub const SQ_PERFCOUNTER_MASK: u32 = 0x36784;
pub const RLC_PERFMON_CLK_CNTL: u32 = 0x37390;

const GFX_INDEX_SA_BROADCAST: u32 = 1 << 29;
const GFX_INDEX_INSTANCE_BROADCAST: u32 = 1 << 30;
const GFX_INDEX_SE_BROADCAST: u32 = 1 << 31;

const PERFMON_STATE_DISABLE_AND_RESET: u32 = 0;
const PERFMON_STATE_START_COUNTING: u32 = 1;
const PERFMON_STATE_STOP_COUNTING: u32 = 2;
const PERFMON_SAMPLE_ENABLE: u32 = 1 << 10;

/// Loop interval of the lock spin, in clocks
const LOCK_LOOP_INTERVAL: u32 = 10;

/// GRBM_GFX_INDEX value selecting a shader engine and instance (`None` broadcasts)
pub fn gfx_index(se: Option<u32>, instance: Option<u32>) -> u32 {
    let mut value = GFX_INDEX_SA_BROADCAST;
    match se {
        Some(se) => value |= (se & 0xff) << 16,
        None => value |= GFX_INDEX_SE_BROADCAST,
    }
    match instance {
        Some(instance) => value |= instance & 0xff,
        None => value |= GFX_INDEX_INSTANCE_BROADCAST,
    }
    value
}

fn emit_instance<S: CommandStream + ?Sized>(cs: &mut S, se: Option<u32>, instance: Option<u32>) {
    cs.set_uconfig_reg(GRBM_GFX_INDEX, gfx_index(se, instance));
}

fn wait_idle<S: CommandStream + ?Sized>(cs: &mut S) {
    cs.event_write(EVENT_CS_PARTIAL_FLUSH);
}

/// Emits the Begin and End sequences of one query pool
#[derive(Debug, Clone, Copy)]
pub struct CommandEmitter<'a> {
    caps: &'a HwCaps,
    schedule: &'a PassSchedule,
    side: SideBuffer,
}

impl<'a> CommandEmitter<'a> {
    pub fn new(caps: &'a HwCaps, schedule: &'a PassSchedule, side: SideBuffer) -> Self {
        Self {
            caps,
            schedule,
            side,
        }
    }

    fn block(&self, run: &ScheduledRun) -> Option<&'a BlockCaps> {
        self.caps.block(run.run.block)
    }

    /// Shader engines and per-engine instances of a block
    fn instance_grid(&self, block: &BlockCaps) -> (u32, u32) {
        (self.caps.shader_engines_for(block.id), block.num_instances)
    }

    fn select_dwords(&self) -> usize {
        let mut dwords = 0;
        for pass in 0..self.schedule.pass_count() {
            dwords += size::COND_EXEC;
            for run in self.schedule.runs() {
                let n = self.schedule.pass_slice(run, pass).len();
                if n == 0 {
                    continue;
                }
                if let Some(block) = self.block(run) {
                    dwords += size::SET_UCONFIG_REG * (1 + n.min(block.select_regs.len()));
                }
            }
        }
        dwords
    }

    fn sample_dwords(&self, end: bool) -> usize {
        let mut dwords = size::EVENT_WRITE * 3 + size::SET_UCONFIG_REG * 3;
        for pass in 0..self.schedule.pass_count() {
            dwords += size::COND_EXEC;
            for run in self.schedule.runs() {
                let n = self.schedule.pass_slice(run, pass).len();
                if n == 0 {
                    continue;
                }
                if let Some(block) = self.block(run) {
                    let (ses, instances) = self.instance_grid(block);
                    let n = n.min(block.counter_regs.len());
                    dwords += ses as usize
                        * instances as usize
                        * (size::SET_UCONFIG_REG + n * size::COPY_DATA);
                }
            }
            if end {
                dwords += size::COPY_DATA;
            }
        }
        dwords
    }

    /// Dwords [`CommandEmitter::begin`] emits
    pub fn begin_dwords(&self) -> usize {
        size::WRITE_DATA
            + size::EVENT_WRITE
            + size::SET_UCONFIG_REG * 5
            + self.select_dwords()
            + self.sample_dwords(false)
            + size::SET_UCONFIG_REG
            + size::EVENT_WRITE
    }

    /// Dwords [`CommandEmitter::end`] emits
    pub fn end_dwords(&self) -> usize {
        size::RELEASE_MEM
            + size::WAIT_REG_MEM
            + size::EVENT_WRITE
            + self.sample_dwords(true)
            + size::SET_UCONFIG_REG * 2
    }

    /// Select every pass's registers, sample begin values into the slot at
    /// `va` and start counting.
    pub fn begin<S: CommandStream + ?Sized>(&self, cs: &mut S, va: u64) -> Result<()> {
        let dwords = self.begin_dwords();
        cs.reserve(dwords)?;
        let start = cs.position();

        cs.write_data(self.side.fence_va(), 0);
        wait_idle(cs);
        emit_instance(cs, None, None);
        cs.set_uconfig_reg(RLC_PERFMON_CLK_CNTL, 1);
        cs.set_uconfig_reg(SQ_PERFCOUNTER_MASK, 0xffff_ffff);
        cs.set_uconfig_reg(SQ_PERFCOUNTER_CTRL, 0x7f);

        for pass in 0..self.schedule.pass_count() {
            let skip = cs.begin_cond_exec(self.side.pass_flag_va(pass));
            for run in self.schedule.runs() {
                let slice = self.schedule.pass_slice(run, pass);
                if slice.is_empty() {
                    continue;
                }
                if let Some(block) = self.block(run) {
                    emit_instance(cs, None, None);
                    emit_select(cs, block, slice);
                }
            }
            cs.end_cond_exec(skip);
        }
        emit_instance(cs, None, None);

        self.stop_and_sample(cs, va, false);

        cs.set_uconfig_reg(CP_PERFMON_CNTL, PERFMON_STATE_START_COUNTING);
        cs.event_write(EVENT_PERFCOUNTER_START);

        debug!(
            "Emitted query begin: {} dwords, {} passes",
            cs.position() - start,
            self.schedule.pass_count()
        );
        Ok(())
    }

    /// Wait for the workload, sample end values into the slot at `va`, mark
    /// the executed pass complete and stop counting.
    pub fn end<S: CommandStream + ?Sized>(&self, cs: &mut S, va: u64) -> Result<()> {
        let dwords = self.end_dwords();
        cs.reserve(dwords)?;
        let start = cs.position();

        let fence = self.side.fence_va();
        cs.release_mem_eop(fence, 1);
        cs.wait_mem_equal(fence, 1, 0xffff_ffff);
        wait_idle(cs);

        self.stop_and_sample(cs, va, true);

        cs.set_uconfig_reg(CP_PERFMON_CNTL, PERFMON_STATE_DISABLE_AND_RESET);
        cs.set_uconfig_reg(RLC_PERFMON_CLK_CNTL, 0);

        debug!("Emitted query end: {} dwords", cs.position() - start);
        Ok(())
    }

    fn stop_and_sample<S: CommandStream + ?Sized>(&self, cs: &mut S, va: u64, end: bool) {
        cs.event_write(EVENT_PERFCOUNTER_SAMPLE);
        wait_idle(cs);
        emit_instance(cs, None, None);
        cs.event_write(EVENT_PERFCOUNTER_STOP);
        cs.set_uconfig_reg(
            CP_PERFMON_CNTL,
            PERFMON_STATE_STOP_COUNTING | PERFMON_SAMPLE_ENABLE,
        );

        let half = if end { 8 } else { 0 };
        for pass in 0..self.schedule.pass_count() {
            let skip = cs.begin_cond_exec(self.side.pass_flag_va(pass));
            for run in self.schedule.runs() {
                let slice = self.schedule.pass_slice(run, pass);
                if slice.is_empty() {
                    continue;
                }
                if let Some(block) = self.block(run) {
                    self.sample_block(cs, block, slice, va + half);
                }
            }
            if end {
                let flag_va = va + self.schedule.completion_flag_offset(pass) as u64;
                cs.copy_imm_to_mem(flag_va, 1, true);
            }
            cs.end_cond_exec(skip);
        }

        emit_instance(cs, None, None);
    }

    /// Read `slots` from every instance of `block`.
    ///
    /// Instance `i` of a register lands at `base + offset + 16 * i`.
    fn sample_block<S: CommandStream + ?Sized>(
        &self,
        cs: &mut S,
        block: &BlockCaps,
        slots: &[RegisterSlot],
        base: u64,
    ) {
        let (ses, instances) = self.instance_grid(block);
        let per_se = block.per_shader_engine;

        for se in 0..ses {
            for instance in 0..instances {
                emit_instance(cs, per_se.then_some(se), Some(instance));
                let linear = (se * instances + instance) as u64;
                for (slot, &counter_reg) in slots.iter().zip(&block.counter_regs) {
                    let va = base + slot.offset as u64 + COUNTER_PAIR_BYTES as u64 * linear;
                    cs.copy_perf_to_mem(counter_reg, va);
                }
            }
        }
    }
}

fn emit_select<S: CommandStream + ?Sized>(cs: &mut S, block: &BlockCaps, slots: &[RegisterSlot]) {
    for (slot, &select_reg) in slots.iter().zip(&block.select_regs) {
        cs.set_uconfig_reg(select_reg, slot.reg.selector | block.select_or);
    }
}

/// Dwords of a lock stream
pub const LOCK_DWORDS: usize = size::ATOMIC_MEM + 2 * size::COPY_DATA;

/// Dwords of an unlock stream
pub const UNLOCK_DWORDS: usize = 3 * size::COPY_DATA;

/// Acquire the device query lock and make `pass` the active pass.
pub fn emit_lock<S: CommandStream + ?Sized>(cs: &mut S, side: &SideBuffer, pass: u32) -> Result<()> {
    cs.reserve(LOCK_DWORDS)?;
    cs.atomic_cmpswap_loop(side.lock_va(), 1, 0, LOCK_LOOP_INTERVAL);
    cs.copy_imm_to_mem(side.pass_flag_va(0), 0, true);
    cs.copy_imm_to_mem(side.pass_flag_va(pass), 1, true);
    Ok(())
}

/// Deactivate `pass`, restore pass 0 as the default and release the lock.
pub fn emit_unlock<S: CommandStream + ?Sized>(
    cs: &mut S,
    side: &SideBuffer,
    pass: u32,
) -> Result<()> {
    cs.reserve(UNLOCK_DWORDS)?;
    cs.copy_imm_to_mem(side.pass_flag_va(pass), 0, true);
    cs.copy_imm_to_mem(side.pass_flag_va(0), 1, true);
    cs.copy_imm_to_mem(side.lock_va(), 0, false);
    Ok(())
}
