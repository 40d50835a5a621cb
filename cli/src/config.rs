//! Device configuration for the CLI
//!
//! Layered from built-in defaults, an optional config file and `TALLY_*`
//! environment variables (highest priority).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_gpu::{BlockCaps, Device, GfxLevel, HwCaps};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TALLY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hardware generation (gfx10, gfx10.3, gfx11)
    pub gfx_level: GfxLevel,

    pub shader_engines: u32,

    pub compute_units: u32,

    /// GPU address of the device side buffer
    pub side_buffer_va: u64,

    /// Dword budget of each emitted command stream
    pub stream_capacity_dwords: usize,

    /// Explicit capability table; empty means the built-in preset
    pub blocks: Vec<BlockCaps>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gfx_level: GfxLevel::Gfx10_3,
            shader_engines: 4,
            compute_units: 40,
            side_buffer_va: 0x1_0000_0000,
            stream_capacity_dwords: tally_gpu::device::DEFAULT_STREAM_CAPACITY,
            blocks: Vec::new(),
        }
    }
}

impl DeviceConfig {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to load device configuration")?
            .try_deserialize()
            .context("Invalid device configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.shader_engines == 0 {
            anyhow::bail!("Shader engine count must be greater than 0");
        }

        if self.compute_units == 0 {
            anyhow::bail!("Compute unit count must be greater than 0");
        }

        if self.stream_capacity_dwords == 0 {
            anyhow::bail!("Stream capacity must be greater than 0");
        }

        if self.side_buffer_va % 8 != 0 {
            anyhow::bail!("Side buffer address must be 8-byte aligned");
        }

        self.caps()
            .validate()
            .context("Invalid counter block capabilities")?;

        Ok(())
    }

    /// Capability table described by this configuration
    pub fn caps(&self) -> HwCaps {
        if self.blocks.is_empty() {
            return HwCaps::preset(self.gfx_level, self.shader_engines, self.compute_units);
        }
        HwCaps {
            gfx_level: self.gfx_level,
            num_shader_engines: self.shader_engines,
            num_compute_units: self.compute_units,
            blocks: self.blocks.clone(),
        }
    }

    pub fn to_device(&self) -> Device {
        Device::new(self.caps(), self.side_buffer_va).with_stream_capacity(self.stream_capacity_dwords)
    }
}
