//! Metric definitions
//!
//! Every metric combines one or more hardware counter registers (and possibly
//! literal constants) with a fixed formula. The table in [`define_metrics`] is
//! append-only: a metric's position is its public index, so new metrics go at
//! the end and generation-specific ones follow the shared prefix.

use crate::hw::{BlockId, GfxLevel, HwCaps};
use tally_shared::Unit;

/// Upper bound on operands per metric
pub const MAX_OPERANDS: usize = 8;

/// A physical counter register: a block plus the event selected on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CounterReg {
    pub block: BlockId,
    pub selector: u32,
}

impl CounterReg {
    pub const fn new(block: BlockId, selector: u32) -> Self {
        Self { block, selector }
    }
}

/// Operand of a metric's formula
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandRef {
    Register(CounterReg),
    Constant(i64),
}

/// Operand list of one metric, stored inline
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    ops: [OperandRef; MAX_OPERANDS],
    len: usize,
}

impl Operands {
    /// Copy up to [`MAX_OPERANDS`] operands
    pub fn from_slice(operands: &[OperandRef]) -> Self {
        debug_assert!(operands.len() <= MAX_OPERANDS);
        let len = operands.len().min(MAX_OPERANDS);
        let mut ops = [OperandRef::Constant(0); MAX_OPERANDS];
        ops[..len].copy_from_slice(&operands[..len]);
        Self { ops, len }
    }
}

impl std::ops::Deref for Operands {
    type Target = [OperandRef];

    fn deref(&self) -> &[OperandRef] {
        &self.ops[..self.len]
    }
}

impl std::fmt::Debug for Operands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// How a metric's operands combine into its final value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    /// Sum of counter deltas
    Sum,
    /// Maximum raw end value
    Max,
    /// `op0 / op1 / op2 * 100`
    RatioDivScale,
    /// `(op1 - op0) / op1 * 100`
    ReverseRatio,
    /// `op0*op1 + op2*op3 + op4*op5 + op6*op7`
    SumWeighted4,
}

/// Stable identifier of a metric, used to derive its UUID.
///
/// Values are never reused or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MetricId {
    GpuCycles = 0,
    ShaderWaves = 1,
    ShaderInstructions = 2,
    ShaderInstructionsValu = 3,
    ShaderInstructionsSalu = 4,
    ShaderInstructionsVmemLoad = 5,
    ShaderInstructionsSmemLoad = 6,
    ShaderInstructionsVmemStore = 7,
    ShaderInstructionsLds = 8,
    ShaderInstructionsGds = 9,
    ShaderValuBusy = 10,
    ShaderSaluBusy = 11,
    VramReadSize = 12,
    VramWriteSize = 13,
    L0CacheHitRatio = 14,
    L1CacheHitRatio = 15,
    L2CacheHitRatio = 16,
    TextureBusy = 17,
    ShaderInstructionsBvh = 18,
}

impl MetricId {
    /// 16-byte UUID: "TALLYPC" prefix, zero padding, id in little endian.
    pub fn uuid(self) -> [u8; 16] {
        let mut uuid = [0u8; 16];
        uuid[..7].copy_from_slice(b"TALLYPC");
        uuid[12..].copy_from_slice(&(self as u32).to_le_bytes());
        uuid
    }
}

/// Immutable description of one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub combination: Combination,
    pub operands: Operands,
    pub unit: Unit,
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub stable_id: MetricId,
}

impl MetricDescriptor {
    /// Register operands, in operand order
    pub fn registers(&self) -> impl Iterator<Item = CounterReg> + '_ {
        self.operands.iter().filter_map(|op| match op {
            OperandRef::Register(reg) => Some(*reg),
            OperandRef::Constant(_) => None,
        })
    }
}

/// Event selector values that differ between generations
struct Selectors {
    gui_active: u32,
    waves: u32,
    insts: u32,
    insts_valu: u32,
    insts_salu: u32,
    insts_vmem_load: u32,
    insts_smem: u32,
    insts_vmem_store: u32,
    insts_lds: u32,
    insts_gds: u32,
    inst_cycles_valu: u32,
    inst_cycles_salu: u32,
    insts_bvh: Option<u32>,
    ta_busy: u32,
    tcp_req: u32,
    tcp_req_miss: u32,
    gl1c_req: u32,
    gl1c_miss: u32,
    gl2c_request: u32,
    gl2c_miss: u32,
    gl2c_ea_rdreq_32b: u32,
    gl2c_ea_rdreq_64b: u32,
    gl2c_ea_rdreq_96b: u32,
    gl2c_ea_rdreq_128b: u32,
    gl2c_mc_wrreq: u32,
    gl2c_ea_wrreq_64b: u32,
}

fn selectors(level: GfxLevel) -> Selectors {
    match level {
        GfxLevel::Gfx10 | GfxLevel::Gfx10_3 => Selectors {
            gui_active: 0x2,
            waves: 0x4,
            insts: 0x1c,
            insts_valu: 0x1d,
            insts_salu: 0x27,
            insts_vmem_load: 0x22,
            insts_smem: 0x25,
            insts_vmem_store: 0x23,
            insts_lds: 0x28,
            insts_gds: 0x29,
            inst_cycles_valu: 0x4c,
            inst_cycles_salu: 0x52,
            insts_bvh: (level == GfxLevel::Gfx10_3).then_some(0x2f),
            ta_busy: 0xf,
            tcp_req: 0x9,
            tcp_req_miss: 0x12,
            gl1c_req: 0xe,
            gl1c_miss: 0x7,
            gl2c_request: 0x3,
            gl2c_miss: 0x2b,
            gl2c_ea_rdreq_32b: 0x59,
            gl2c_ea_rdreq_64b: 0x5a,
            gl2c_ea_rdreq_96b: 0x5b,
            gl2c_ea_rdreq_128b: 0x5c,
            gl2c_mc_wrreq: 0x4b,
            gl2c_ea_wrreq_64b: 0x4c,
        },
        GfxLevel::Gfx11 => Selectors {
            gui_active: 0x2,
            waves: 0x4,
            insts: 0x1a,
            insts_valu: 0x1b,
            insts_salu: 0x25,
            insts_vmem_load: 0x20,
            insts_smem: 0x23,
            insts_vmem_store: 0x21,
            insts_lds: 0x26,
            insts_gds: 0x27,
            inst_cycles_valu: 0x45,
            inst_cycles_salu: 0x4a,
            insts_bvh: Some(0x2d),
            ta_busy: 0xf,
            tcp_req: 0x9,
            tcp_req_miss: 0x12,
            gl1c_req: 0xe,
            gl1c_miss: 0x7,
            gl2c_request: 0x3,
            gl2c_miss: 0x2b,
            gl2c_ea_rdreq_32b: 0x66,
            gl2c_ea_rdreq_64b: 0x67,
            gl2c_ea_rdreq_96b: 0x68,
            gl2c_ea_rdreq_128b: 0x69,
            gl2c_mc_wrreq: 0x4e,
            gl2c_ea_wrreq_64b: 0x4f,
        },
    }
}

/// Blocks the metric table reads from
pub const REQUIRED_BLOCKS: [BlockId; 6] = [
    BlockId::Grbm,
    BlockId::Sq,
    BlockId::Ta,
    BlockId::Tcp,
    BlockId::Gl1c,
    BlockId::Gl2c,
];

/// Number of metrics [`define_metrics`] appends for a generation
pub fn metric_count(level: GfxLevel) -> usize {
    if selectors(level).insts_bvh.is_some() {
        19
    } else {
        18
    }
}

/// Append the metric table for `caps` to `out`.
///
/// `out` must already have room for [`metric_count`] entries.
pub fn define_metrics(caps: &HwCaps, out: &mut Vec<MetricDescriptor>) {
    use BlockId::*;
    use Combination::*;
    use OperandRef::Constant;

    let s = selectors(caps.gfx_level);
    let reg = |block, selector| OperandRef::Register(CounterReg::new(block, selector));
    let num_cus = caps.num_compute_units as i64;
    let num_simds = num_cus * caps.gfx_level.simds_per_cu() as i64;
    let gpu_cycles = reg(Grbm, s.gui_active);

    let mut add = |combination,
                   unit,
                   name,
                   category,
                   description,
                   stable_id,
                   operands: &[OperandRef]| {
        out.push(MetricDescriptor {
            combination,
            operands: Operands::from_slice(operands),
            unit,
            name,
            category,
            description,
            stable_id,
        });
    };

    add(
        Max,
        Unit::Cycles,
        "GPU active cycles",
        "GRBM",
        "Cycles the GPU is active processing a command buffer.",
        MetricId::GpuCycles,
        &[gpu_cycles],
    );

    let shader_counts = [
        ("Waves", "Number of waves executed", MetricId::ShaderWaves, s.waves),
        ("Instructions", "Number of instructions executed", MetricId::ShaderInstructions, s.insts),
        ("VALU Instructions", "Number of VALU instructions executed", MetricId::ShaderInstructionsValu, s.insts_valu),
        ("SALU Instructions", "Number of SALU instructions executed", MetricId::ShaderInstructionsSalu, s.insts_salu),
        ("VMEM Load Instructions", "Number of VMEM load instructions executed", MetricId::ShaderInstructionsVmemLoad, s.insts_vmem_load),
        ("SMEM Load Instructions", "Number of SMEM load instructions executed", MetricId::ShaderInstructionsSmemLoad, s.insts_smem),
        ("VMEM Store Instructions", "Number of VMEM store instructions executed", MetricId::ShaderInstructionsVmemStore, s.insts_vmem_store),
        ("LDS Instructions", "Number of LDS instructions executed", MetricId::ShaderInstructionsLds, s.insts_lds),
        ("GDS Instructions", "Number of GDS instructions executed", MetricId::ShaderInstructionsGds, s.insts_gds),
    ];
    for (name, description, id, selector) in shader_counts {
        add(Sum, Unit::Generic, name, "Shaders", description, id, &[reg(Sq, selector)]);
    }

    add(
        RatioDivScale,
        Unit::Percentage,
        "VALU Busy",
        "Shader Utilization",
        "Percentage of time the VALU units are busy.",
        MetricId::ShaderValuBusy,
        &[reg(Sq, s.inst_cycles_valu), gpu_cycles, Constant(num_simds)],
    );
    add(
        RatioDivScale,
        Unit::Percentage,
        "SALU Busy",
        "Shader Utilization",
        "Percentage of time the SALU units are busy.",
        MetricId::ShaderSaluBusy,
        &[reg(Sq, s.inst_cycles_salu), gpu_cycles, Constant(num_cus)],
    );

    add(
        SumWeighted4,
        Unit::Bytes,
        "VRAM read size",
        "Memory",
        "Number of bytes read from VRAM.",
        MetricId::VramReadSize,
        &[
            reg(Gl2c, s.gl2c_ea_rdreq_32b),
            Constant(32),
            reg(Gl2c, s.gl2c_ea_rdreq_64b),
            Constant(64),
            reg(Gl2c, s.gl2c_ea_rdreq_96b),
            Constant(96),
            reg(Gl2c, s.gl2c_ea_rdreq_128b),
            Constant(128),
        ],
    );
    add(
        SumWeighted4,
        Unit::Bytes,
        "VRAM write size",
        "Memory",
        "Number of bytes written to VRAM.",
        MetricId::VramWriteSize,
        &[
            reg(Gl2c, s.gl2c_mc_wrreq),
            Constant(32),
            reg(Gl2c, s.gl2c_ea_wrreq_64b),
            Constant(64),
            Constant(0),
            Constant(0),
            Constant(0),
            Constant(0),
        ],
    );

    add(
        ReverseRatio,
        Unit::Percentage,
        "L0 cache hit ratio",
        "Memory",
        "Hit ratio of the L0 cache.",
        MetricId::L0CacheHitRatio,
        &[reg(Tcp, s.tcp_req_miss), reg(Tcp, s.tcp_req)],
    );
    add(
        ReverseRatio,
        Unit::Percentage,
        "L1 cache hit ratio",
        "Memory",
        "Hit ratio of the L1 cache.",
        MetricId::L1CacheHitRatio,
        &[reg(Gl1c, s.gl1c_miss), reg(Gl1c, s.gl1c_req)],
    );
    add(
        ReverseRatio,
        Unit::Percentage,
        "L2 cache hit ratio",
        "Memory",
        "Hit ratio of the L2 cache.",
        MetricId::L2CacheHitRatio,
        &[reg(Gl2c, s.gl2c_miss), reg(Gl2c, s.gl2c_request)],
    );

    add(
        RatioDivScale,
        Unit::Percentage,
        "Texture unit busy",
        "Memory",
        "Percentage of time the texture addressing units are busy.",
        MetricId::TextureBusy,
        &[reg(Ta, s.ta_busy), gpu_cycles, Constant(num_cus)],
    );

    // Generation-specific metrics below this line.
    if let Some(bvh) = s.insts_bvh {
        add(
            Sum,
            Unit::Generic,
            "Ray tracing instructions",
            "Shaders",
            "Number of BVH intersection instructions executed",
            MetricId::ShaderInstructionsBvh,
            &[reg(Sq, bvh)],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(level: GfxLevel) -> Vec<MetricDescriptor> {
        let caps = HwCaps::preset(level, 4, 40);
        let mut out = Vec::new();
        define_metrics(&caps, &mut out);
        out
    }

    #[test]
    fn test_metric_count_matches_table() {
        for level in [GfxLevel::Gfx10, GfxLevel::Gfx10_3, GfxLevel::Gfx11] {
            assert_eq!(table(level).len(), metric_count(level));
        }
    }

    #[test]
    fn test_shared_prefix_is_stable() {
        let old = table(GfxLevel::Gfx10);
        let new = table(GfxLevel::Gfx10_3);
        for (a, b) in old.iter().zip(new.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.stable_id, b.stable_id);
        }
        assert_eq!(new.last().unwrap().stable_id, MetricId::ShaderInstructionsBvh);
    }

    #[test]
    fn test_operand_limits() {
        for desc in table(GfxLevel::Gfx11) {
            assert!(!desc.operands.is_empty());
            assert!(desc.operands.len() <= MAX_OPERANDS);
            if desc.combination == Combination::SumWeighted4 {
                assert_eq!(desc.operands.len(), 8);
            }
        }
    }

    #[test]
    fn test_constants_follow_caps() {
        let metrics = table(GfxLevel::Gfx10_3);
        let valu = metrics.iter().find(|m| m.name == "VALU Busy").unwrap();
        assert_eq!(valu.operands[2], OperandRef::Constant(80));
        assert_eq!(valu.registers().count(), 2);
    }

    #[test]
    fn test_operands_inline() {
        let ops = Operands::from_slice(&[
            OperandRef::Register(CounterReg::new(BlockId::Sq, 3)),
            OperandRef::Constant(64),
        ]);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1], OperandRef::Constant(64));
        assert_eq!(format!("{:?}", ops), format!("{:?}", &ops[..]));
    }

    #[test]
    fn test_uuid_layout() {
        let uuid = MetricId::L2CacheHitRatio.uuid();
        assert_eq!(&uuid[..7], b"TALLYPC");
        assert_eq!(&uuid[12..], &16u32.to_le_bytes());
    }

    #[test]
    fn test_all_blocks_are_required() {
        for desc in table(GfxLevel::Gfx11) {
            for reg in desc.registers() {
                assert!(REQUIRED_BLOCKS.contains(&reg.block));
            }
        }
    }
}
