//! Command stream primitives
//!
//! Type-3 packet encoding for the handful of packets counter queries use. The
//! [`CommandStream`] trait is the seam to the driver's real command buffers:
//! implementors only provide dword storage, the packet helpers are shared.
//! [`PacketStream`] is a bounded in-memory implementation.

use crate::error::{Error, Result};

pub const PKT3_COND_EXEC: u8 = 0x22;
pub const PKT3_ATOMIC_MEM: u8 = 0x1e;
pub const PKT3_WRITE_DATA: u8 = 0x37;
pub const PKT3_WAIT_REG_MEM: u8 = 0x3c;
pub const PKT3_COPY_DATA: u8 = 0x40;
pub const PKT3_EVENT_WRITE: u8 = 0x46;
pub const PKT3_RELEASE_MEM: u8 = 0x49;
pub const PKT3_SET_UCONFIG_REG: u8 = 0x79;

pub const UCONFIG_REG_START: u32 = 0x30000;

// Event types
pub const EVENT_CS_PARTIAL_FLUSH: u32 = 0x07;
pub const EVENT_PERFCOUNTER_START: u32 = 0x17;
pub const EVENT_PERFCOUNTER_STOP: u32 = 0x18;
pub const EVENT_PERFCOUNTER_SAMPLE: u32 = 0x1b;
pub const EVENT_BOTTOM_OF_PIPE_TS: u32 = 0x28;

// COPY_DATA control
const COPY_DATA_SRC_PERF: u32 = 4;
const COPY_DATA_SRC_IMM: u32 = 5;
const COPY_DATA_DST_MEM: u32 = 5 << 8;
const COPY_DATA_DST_TC_L2: u32 = 2 << 8;
const COPY_DATA_COUNT_SEL: u32 = 1 << 16;
const COPY_DATA_WR_CONFIRM: u32 = 1 << 20;

// ATOMIC_MEM control
const ATOMIC_OP_CMPSWAP_32: u32 = 8;
const ATOMIC_COMMAND_LOOP: u32 = 1 << 8;

// WRITE_DATA / WAIT_REG_MEM control
const WRITE_DATA_DST_MEM: u32 = 5 << 8;
const WRITE_DATA_WR_CONFIRM: u32 = 1 << 20;
const WAIT_REG_MEM_EQUAL: u32 = 3;
const WAIT_REG_MEM_MEM_SPACE: u32 = 1 << 4;

/// Dwords taken by each helper, for space reservation
pub mod size {
    pub const SET_UCONFIG_REG: usize = 3;
    pub const EVENT_WRITE: usize = 2;
    pub const COND_EXEC: usize = 5;
    pub const COPY_DATA: usize = 6;
    pub const WRITE_DATA: usize = 5;
    pub const ATOMIC_MEM: usize = 9;
    pub const WAIT_REG_MEM: usize = 7;
    pub const RELEASE_MEM: usize = 8;
}

/// Type-3 packet header
pub const fn pkt3(opcode: u8, body_dwords: u32) -> u32 {
    (3 << 30) | (((body_dwords - 1) & 0x3fff) << 16) | ((opcode as u32) << 8)
}

/// Dword left to be filled in once the length of the following span is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchPoint(usize);

impl PatchPoint {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Append-only dword sink with patchable placeholders
pub trait CommandStream {
    /// Ensure `dwords` more dwords can be emitted.
    fn reserve(&mut self, dwords: usize) -> Result<()>;

    fn emit(&mut self, dword: u32);

    /// Index the next emitted dword will have
    fn position(&self) -> usize;

    /// Overwrite a previously emitted dword
    fn patch(&mut self, at: PatchPoint, value: u32);

    fn emit_va(&mut self, va: u64) {
        self.emit(va as u32);
        self.emit((va >> 32) as u32);
    }

    fn set_uconfig_reg(&mut self, reg: u32, value: u32) {
        debug_assert!(reg >= UCONFIG_REG_START);
        self.emit(pkt3(PKT3_SET_UCONFIG_REG, 2));
        self.emit((reg - UCONFIG_REG_START) >> 2);
        self.emit(value);
    }

    fn event_write(&mut self, event: u32) {
        self.emit(pkt3(PKT3_EVENT_WRITE, 1));
        self.emit(event & 0x3f);
    }

    /// Open a span executed only if the 32-bit word at `pred_va` is non-zero.
    ///
    /// The returned point must be closed with [`CommandStream::end_cond_exec`].
    fn begin_cond_exec(&mut self, pred_va: u64) -> PatchPoint {
        self.emit(pkt3(PKT3_COND_EXEC, 4));
        self.emit_va(pred_va);
        self.emit(0);
        let at = PatchPoint(self.position());
        self.emit(0);
        at
    }

    /// Back-fill the skip length of a conditional span
    fn end_cond_exec(&mut self, at: PatchPoint) {
        let skip = self.position() - at.0 - 1;
        self.patch(at, skip as u32);
    }

    /// Copy a 64-bit performance counter register to memory
    fn copy_perf_to_mem(&mut self, reg: u32, va: u64) {
        self.emit(pkt3(PKT3_COPY_DATA, 5));
        self.emit(
            COPY_DATA_SRC_PERF | COPY_DATA_DST_TC_L2 | COPY_DATA_COUNT_SEL | COPY_DATA_WR_CONFIRM,
        );
        self.emit(reg >> 2);
        self.emit(0);
        self.emit_va(va);
    }

    /// Store an immediate (32-bit unless `wide`) to memory
    fn copy_imm_to_mem(&mut self, va: u64, value: u64, wide: bool) {
        let count = if wide { COPY_DATA_COUNT_SEL } else { 0 };
        self.emit(pkt3(PKT3_COPY_DATA, 5));
        self.emit(COPY_DATA_SRC_IMM | COPY_DATA_DST_MEM | count | COPY_DATA_WR_CONFIRM);
        self.emit(value as u32);
        self.emit((value >> 32) as u32);
        self.emit_va(va);
    }

    fn write_data(&mut self, va: u64, value: u32) {
        self.emit(pkt3(PKT3_WRITE_DATA, 4));
        self.emit(WRITE_DATA_DST_MEM | WRITE_DATA_WR_CONFIRM);
        self.emit_va(va);
        self.emit(value);
    }

    /// Spin until the 32-bit word at `va` equals `compare`, then store `data`
    fn atomic_cmpswap_loop(&mut self, va: u64, data: u32, compare: u32, loop_interval: u32) {
        self.emit(pkt3(PKT3_ATOMIC_MEM, 8));
        self.emit(ATOMIC_OP_CMPSWAP_32 | ATOMIC_COMMAND_LOOP);
        self.emit_va(va);
        self.emit(data);
        self.emit(0);
        self.emit(compare);
        self.emit(0);
        self.emit(loop_interval);
    }

    fn wait_mem_equal(&mut self, va: u64, value: u32, mask: u32) {
        self.emit(pkt3(PKT3_WAIT_REG_MEM, 6));
        self.emit(WAIT_REG_MEM_EQUAL | WAIT_REG_MEM_MEM_SPACE);
        self.emit_va(va);
        self.emit(value);
        self.emit(mask);
        self.emit(4);
    }

    /// Write `value` to `va` once all prior work reaches the bottom of the pipe
    fn release_mem_eop(&mut self, va: u64, value: u32) {
        self.emit(pkt3(PKT3_RELEASE_MEM, 7));
        self.emit(EVENT_BOTTOM_OF_PIPE_TS | (5 << 8));
        self.emit(1 << 29);
        self.emit_va(va);
        self.emit(value);
        self.emit(0);
        self.emit(0);
    }
}

/// Bounded in-memory command stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketStream {
    dwords: Vec<u32>,
    capacity: usize,
}

impl PacketStream {
    /// Create a stream that holds at most `capacity` dwords
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            dwords: Vec::new(),
            capacity,
        }
    }

    pub fn dwords(&self) -> &[u32] {
        &self.dwords
    }

    pub fn len(&self) -> usize {
        self.dwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dwords.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn into_dwords(self) -> Vec<u32> {
        self.dwords
    }
}

impl CommandStream for PacketStream {
    fn reserve(&mut self, dwords: usize) -> Result<()> {
        let available = self.capacity.saturating_sub(self.dwords.len());
        if dwords > available {
            return Err(Error::CommandStreamFull {
                requested: dwords,
                available,
            });
        }
        self.dwords.try_reserve(dwords)?;
        Ok(())
    }

    fn emit(&mut self, dword: u32) {
        debug_assert!(self.dwords.len() < self.capacity, "emit past reserved space");
        self.dwords.push(dword);
    }

    fn position(&self) -> usize {
        self.dwords.len()
    }

    fn patch(&mut self, at: PatchPoint, value: u32) {
        self.dwords[at.0] = value;
    }
}

/// One decoded type-3 packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<'a> {
    pub opcode: u8,
    pub body: &'a [u32],
}

impl Packet<'_> {
    pub fn name(&self) -> &'static str {
        match self.opcode {
            PKT3_COND_EXEC => "COND_EXEC",
            PKT3_ATOMIC_MEM => "ATOMIC_MEM",
            PKT3_WRITE_DATA => "WRITE_DATA",
            PKT3_WAIT_REG_MEM => "WAIT_REG_MEM",
            PKT3_COPY_DATA => "COPY_DATA",
            PKT3_EVENT_WRITE => "EVENT_WRITE",
            PKT3_RELEASE_MEM => "RELEASE_MEM",
            PKT3_SET_UCONFIG_REG => "SET_UCONFIG_REG",
            _ => "UNKNOWN",
        }
    }
}

/// Split a dword stream into packets. Stops at the first malformed header.
pub fn parse_packets(dwords: &[u32]) -> Vec<Packet<'_>> {
    let mut packets = Vec::new();
    let mut i = 0;
    while i < dwords.len() {
        let header = dwords[i];
        if header >> 30 != 3 {
            break;
        }
        let body_len = (((header >> 16) & 0x3fff) + 1) as usize;
        let end = i + 1 + body_len;
        if end > dwords.len() {
            break;
        }
        packets.push(Packet {
            opcode: ((header >> 8) & 0xff) as u8,
            body: &dwords[i + 1..end],
        });
        i = end;
    }
    packets
}
