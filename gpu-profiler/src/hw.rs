//! Hardware capability table
//!
//! Describes the counter blocks a device exposes: how many counters each block
//! can sample at once, how many times the block is replicated, and which
//! registers select and hold its counters. The driver normally receives this
//! table from the kernel/firmware layer; [`HwCaps::preset`] provides tables for
//! the generations Tally knows about.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Engine and instance indices written to GRBM_GFX_INDEX are 8 bits wide
pub const MAX_GFX_INDEX: u32 = 256;

/// GPU graphics IP generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GfxLevel {
    Gfx10,
    #[serde(rename = "gfx10.3")]
    Gfx10_3,
    Gfx11,
}

impl GfxLevel {
    /// SIMD units per compute unit
    pub fn simds_per_cu(self) -> u32 {
        match self {
            GfxLevel::Gfx10 | GfxLevel::Gfx10_3 | GfxLevel::Gfx11 => 2,
        }
    }
}

impl std::str::FromStr for GfxLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gfx10" => Ok(GfxLevel::Gfx10),
            "gfx10.3" | "gfx10_3" | "gfx1030" => Ok(GfxLevel::Gfx10_3),
            "gfx11" => Ok(GfxLevel::Gfx11),
            _ => Err(format!("Unknown gfx level: {}", s)),
        }
    }
}

impl std::fmt::Display for GfxLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GfxLevel::Gfx10 => "gfx10",
            GfxLevel::Gfx10_3 => "gfx10.3",
            GfxLevel::Gfx11 => "gfx11",
        };
        f.write_str(name)
    }
}

/// Hardware counter block identifier.
///
/// The declaration order is the sort order of resolved registers, so blocks
/// form contiguous runs in a sorted register list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BlockId {
    Grbm,
    Sq,
    Ta,
    Tcp,
    Gl1c,
    Gl2c,
}

impl BlockId {
    pub fn name(self) -> &'static str {
        match self {
            BlockId::Grbm => "GRBM",
            BlockId::Sq => "SQ",
            BlockId::Ta => "TA",
            BlockId::Tcp => "TCP",
            BlockId::Gl1c => "GL1C",
            BlockId::Gl2c => "GL2C",
        }
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Counter capabilities of one hardware block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCaps {
    pub id: BlockId,

    /// Counters that can be selected and sampled simultaneously
    pub num_counters: u32,

    /// Instances per scope (per shader engine when `per_shader_engine`, else global)
    pub num_instances: u32,

    /// Block is replicated in every shader engine
    #[serde(default)]
    pub per_shader_engine: bool,

    /// Select register of each counter slot
    pub select_regs: Vec<u32>,

    /// Low half of each counter slot's 64-bit value
    pub counter_regs: Vec<u32>,

    /// Bits OR-ed into every select value written to this block
    #[serde(default)]
    pub select_or: u32,
}

/// Device-wide counter capability table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwCaps {
    pub gfx_level: GfxLevel,
    pub num_shader_engines: u32,
    pub num_compute_units: u32,
    pub blocks: Vec<BlockCaps>,
}

impl HwCaps {
    /// Look up a block's capabilities
    pub fn block(&self, id: BlockId) -> Option<&BlockCaps> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Shader engines a block's instances are spread across (1 for global blocks)
    pub fn shader_engines_for(&self, id: BlockId) -> u32 {
        match self.block(id) {
            Some(b) if b.per_shader_engine => self.num_shader_engines,
            Some(_) => 1,
            None => 0,
        }
    }

    /// Total number of times a register of this block must be read.
    pub fn instance_count(&self, id: BlockId) -> u32 {
        self.block(id)
            .map(|b| b.num_instances.saturating_mul(self.shader_engines_for(id)))
            .unwrap_or(0)
    }

    /// Check that every block can be programmed as described.
    ///
    /// Each block needs a select and a counter register for every counter
    /// slot, and its engine and instance indices must fit GRBM_GFX_INDEX.
    pub fn validate(&self) -> Result<()> {
        for b in &self.blocks {
            let slots = b.num_counters as usize;
            let reason = if b.select_regs.len() < slots {
                Some("fewer select registers than counters")
            } else if b.counter_regs.len() < slots {
                Some("fewer counter registers than counters")
            } else if b.num_instances > MAX_GFX_INDEX {
                Some("too many instances")
            } else if b.per_shader_engine && self.num_shader_engines > MAX_GFX_INDEX {
                Some("too many shader engines")
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(Error::InvalidCapability { block: b.id, reason });
            }
        }
        Ok(())
    }

    /// Simultaneous counter capacity of a block (0 if the block is absent)
    pub fn capacity(&self, id: BlockId) -> u32 {
        self.block(id).map(|b| b.num_counters).unwrap_or(0)
    }

    /// Built-in capability table for a generation.
    pub fn preset(gfx_level: GfxLevel, num_shader_engines: u32, num_compute_units: u32) -> Self {
        let cus_per_se = (num_compute_units / num_shader_engines.max(1)).max(1);
        let l2_channels = match gfx_level {
            GfxLevel::Gfx10 | GfxLevel::Gfx10_3 => 16,
            GfxLevel::Gfx11 => 24,
        };
        let sq_counters = match gfx_level {
            GfxLevel::Gfx10 | GfxLevel::Gfx10_3 => 8,
            GfxLevel::Gfx11 => 16,
        };

        let blocks = vec![
            block(BlockId::Grbm, 2, 1, false, 0x36100, 0x34100, 0),
            block(BlockId::Sq, sq_counters, 1, true, 0x36700, 0x34700, 0x0f << 24),
            block(BlockId::Ta, 2, cus_per_se, true, 0x36b00, 0x34b00, 0),
            block(BlockId::Tcp, 4, cus_per_se, true, 0x36d00, 0x34d00, 0),
            block(BlockId::Gl1c, 4, 4, true, 0x36980, 0x34980, 0),
            block(BlockId::Gl2c, 4, l2_channels, false, 0x36e00, 0x34e00, 0),
        ];

        Self {
            gfx_level,
            num_shader_engines,
            num_compute_units,
            blocks,
        }
    }
}

fn block(
    id: BlockId,
    num_counters: u32,
    num_instances: u32,
    per_shader_engine: bool,
    select_base: u32,
    counter_base: u32,
    select_or: u32,
) -> BlockCaps {
    BlockCaps {
        id,
        num_counters,
        num_instances,
        per_shader_engine,
        select_regs: (0..num_counters).map(|i| select_base + 4 * i).collect(),
        counter_regs: (0..num_counters).map(|i| counter_base + 8 * i).collect(),
        select_or,
    }
}
