//! Per-device query state
//!
//! A [`Device`] owns what every query pool on it shares: the capability
//! table, the lazily built metric catalog, the side buffer holding the query
//! lock and pass flags, and the cached lock/unlock streams for each pass.

use crate::catalog::MetricCatalog;
use crate::cmdstream::PacketStream;
use crate::emit::{emit_lock, emit_unlock, LOCK_DWORDS, UNLOCK_DWORDS};
use crate::error::{Error, Result};
use crate::hw::HwCaps;
use crate::pool::QueryPool;
use once_cell::sync::OnceCell;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Most passes a single query pool may need
pub const PERF_CTR_MAX_PASSES: u32 = 512;

const LOCK_OFFSET: u64 = 0;
const FENCE_OFFSET: u64 = 8;
const PASS_FLAGS_OFFSET: u64 = 16;

/// Default dword budget of streams handed out by [`Device::new_stream`]
pub const DEFAULT_STREAM_CAPACITY: usize = 64 * 1024;

/// GPU-visible scratch memory shared by all query pools of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideBuffer {
    va: u64,
}

impl SideBuffer {
    pub fn new(va: u64) -> Self {
        Self { va }
    }

    pub fn va(&self) -> u64 {
        self.va
    }

    /// Bytes the buffer must span
    pub fn size() -> u64 {
        PASS_FLAGS_OFFSET + 8 * PERF_CTR_MAX_PASSES as u64
    }

    /// Query lock word, 0 when no pass-select span is live
    pub fn lock_va(&self) -> u64 {
        self.va + LOCK_OFFSET
    }

    /// End-of-pipe fence written by query End
    pub fn fence_va(&self) -> u64 {
        self.va + FENCE_OFFSET
    }

    /// Ready flag of a pass
    pub fn pass_flag_va(&self, pass: u32) -> u64 {
        debug_assert!(pass < PERF_CTR_MAX_PASSES);
        self.va + PASS_FLAGS_OFFSET + 8 * pass as u64
    }
}

/// Cached preamble and postamble of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStreams {
    pub lock: Arc<[u32]>,
    pub unlock: Arc<[u32]>,
}

/// Counter query state of one GPU
#[derive(Debug)]
pub struct Device {
    caps: Arc<HwCaps>,
    side: SideBuffer,
    stream_capacity: usize,

    // `None` records a failed build; later calls fail without rebuilding
    catalog: OnceCell<Option<Arc<MetricCatalog>>>,

    pass_streams: RwLock<Vec<PassStreams>>,
}

impl Device {
    /// Create device state. `side_va` must point at [`SideBuffer::size`]
    /// zeroed bytes, except pass flag 0 which starts at 1.
    pub fn new(caps: HwCaps, side_va: u64) -> Self {
        log_caps(&caps);
        Self {
            caps: Arc::new(caps),
            side: SideBuffer::new(side_va),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            catalog: OnceCell::new(),
            pass_streams: RwLock::new(Vec::new()),
        }
    }

    pub fn with_stream_capacity(mut self, dwords: usize) -> Self {
        self.stream_capacity = dwords;
        self
    }

    pub fn caps(&self) -> &HwCaps {
        &self.caps
    }

    pub fn side_buffer(&self) -> SideBuffer {
        self.side
    }

    /// The device's metric catalog, built on first use.
    ///
    /// If the first build finds no usable counter blocks it fails with
    /// [`Error::HardwareCapabilityUnavailable`] and every later call fails
    /// with [`Error::OutOfMemory`].
    pub fn catalog(&self) -> Result<Arc<MetricCatalog>> {
        if let Some(cached) = self.catalog.get() {
            return cached.clone().ok_or(Error::OutOfMemory);
        }

        let mut unavailable = false;
        let cached = self
            .catalog
            .get_or_try_init(|| match MetricCatalog::build(&self.caps) {
                Ok(catalog) => Ok(Some(Arc::new(catalog))),
                Err(Error::HardwareCapabilityUnavailable) => {
                    unavailable = true;
                    Ok(None)
                }
                Err(e) => Err(e),
            })?;

        match cached {
            Some(catalog) => Ok(Arc::clone(catalog)),
            None if unavailable => Err(Error::HardwareCapabilityUnavailable),
            None => Err(Error::OutOfMemory),
        }
    }

    /// Passes a pool for `metric_indices` would need
    pub fn query_passes(&self, metric_indices: &[u32]) -> Result<u32> {
        let catalog = self.catalog()?;
        let set = crate::alloc::RegisterSet::collect(&catalog, metric_indices)?;
        Ok(crate::schedule::passes_needed(&set, &self.caps))
    }

    /// Create a query pool and make sure lock streams exist for all its passes.
    pub fn create_query_pool(&self, metric_indices: &[u32]) -> Result<QueryPool> {
        let catalog = self.catalog()?;
        let pool = QueryPool::new(catalog, Arc::clone(&self.caps), self.side, metric_indices)?;
        self.prepare_pass_streams(pool.pass_count())?;
        Ok(pool)
    }

    /// Build the lock/unlock streams of passes `0..pass_count` not yet cached.
    pub fn prepare_pass_streams(&self, pass_count: u32) -> Result<()> {
        debug_assert!(
            pass_count <= PERF_CTR_MAX_PASSES,
            "{} passes exceed the side buffer",
            pass_count
        );
        let wanted = pass_count.min(PERF_CTR_MAX_PASSES) as usize;

        {
            let streams = self.pass_streams.read().unwrap_or_else(PoisonError::into_inner);
            if streams.len() >= wanted {
                return Ok(());
            }
        }

        let mut streams = self.pass_streams.write().unwrap_or_else(PoisonError::into_inner);
        let cached = streams.len();
        if cached >= wanted {
            return Ok(());
        }
        streams.try_reserve_exact(wanted - cached)?;

        for pass in cached as u32..wanted as u32 {
            let mut lock = PacketStream::with_capacity(LOCK_DWORDS);
            emit_lock(&mut lock, &self.side, pass)?;
            let mut unlock = PacketStream::with_capacity(UNLOCK_DWORDS);
            emit_unlock(&mut unlock, &self.side, pass)?;
            streams.push(PassStreams {
                lock: lock.into_dwords().into(),
                unlock: unlock.into_dwords().into(),
            });
        }

        debug!("Cached lock streams for passes {}..{}", cached, wanted);
        Ok(())
    }

    /// Cached lock/unlock streams of a pass
    pub fn pass_streams(&self, pass: u32) -> Option<PassStreams> {
        let streams = self.pass_streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.get(pass as usize).cloned()
    }

    /// Number of passes with cached streams
    pub fn cached_passes(&self) -> u32 {
        let streams = self.pass_streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.len() as u32
    }

    /// An empty command stream with the device's dword budget
    pub fn new_stream(&self) -> PacketStream {
        PacketStream::with_capacity(self.stream_capacity)
    }
}

fn log_caps(caps: &HwCaps) {
    if caps.blocks.is_empty() {
        warn!("{}: no counter blocks", caps.gfx_level);
        return;
    }
    info!(
        "{}: {} shader engines, {} compute units, {} counter blocks",
        caps.gfx_level,
        caps.num_shader_engines,
        caps.num_compute_units,
        caps.blocks.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmdstream::parse_packets;
    use crate::hw::{BlockId, GfxLevel};

    const SIDE_VA: u64 = 0x1_0000_0000;

    fn device() -> Device {
        Device::new(HwCaps::preset(GfxLevel::Gfx10_3, 2, 8), SIDE_VA)
    }

    #[test]
    fn test_side_buffer_layout() {
        let side = SideBuffer::new(SIDE_VA);
        assert_eq!(side.lock_va(), SIDE_VA);
        assert_eq!(side.fence_va(), SIDE_VA + 8);
        assert_eq!(side.pass_flag_va(0), SIDE_VA + 16);
        assert_eq!(side.pass_flag_va(3), SIDE_VA + 40);
        assert_eq!(SideBuffer::size(), 16 + 8 * 512);
    }

    #[test]
    fn test_catalog_is_shared() {
        let device = device();
        let a = device.catalog().unwrap();
        let b = device.catalog().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_catalog_failure_is_cached() {
        let mut caps = HwCaps::preset(GfxLevel::Gfx10, 1, 4);
        caps.blocks.clear();
        let device = Device::new(caps, SIDE_VA);
        assert_eq!(
            device.catalog().unwrap_err(),
            Error::HardwareCapabilityUnavailable
        );
        assert_eq!(device.catalog().unwrap_err(), Error::OutOfMemory);
        assert_eq!(device.create_query_pool(&[0]).unwrap_err(), Error::OutOfMemory);
    }

    #[test]
    fn test_malformed_loaded_caps_fail_pool_creation() {
        let mut caps = HwCaps::preset(GfxLevel::Gfx10_3, 2, 8);
        for b in caps.blocks.iter_mut().filter(|b| b.id == BlockId::Sq) {
            b.select_regs.truncate(1);
        }
        let json = serde_json::to_string(&caps).unwrap();
        let loaded: HwCaps = serde_json::from_str(&json).unwrap();
        let device = Device::new(loaded, SIDE_VA);
        assert_eq!(
            device.create_query_pool(&[1, 2]).unwrap_err(),
            Error::HardwareCapabilityUnavailable
        );

        let mut caps = HwCaps::preset(GfxLevel::Gfx10_3, 2, 8);
        for b in caps.blocks.iter_mut().filter(|b| b.id == BlockId::Gl2c) {
            b.num_instances = 1 << 28;
        }
        let device = Device::new(caps, SIDE_VA);
        assert_eq!(
            device.create_query_pool(&[12]).unwrap_err(),
            Error::HardwareCapabilityUnavailable
        );
        assert_eq!(device.cached_passes(), 0);
    }

    #[test]
    fn test_pool_creation_caches_pass_streams() {
        let device = device();
        assert_eq!(device.cached_passes(), 0);

        // eleven SQ registers on an eight-counter block
        let indices: Vec<u32> = (1..=11).collect();
        let pool = device.create_query_pool(&indices).unwrap();
        assert_eq!(pool.pass_count(), 2);
        assert_eq!(device.cached_passes(), 2);

        for pass in 0..pool.pass_count() {
            let streams = device.pass_streams(pass).unwrap();
            assert_eq!(streams.lock.len(), LOCK_DWORDS);
            assert_eq!(streams.unlock.len(), UNLOCK_DWORDS);
            let packets = parse_packets(&streams.lock);
            let flag = packets[2].body[3] as u64 | (packets[2].body[4] as u64) << 32;
            assert_eq!(flag, device.side_buffer().pass_flag_va(pass));
        }
        assert!(device.pass_streams(pool.pass_count()).is_none());
    }

    #[test]
    fn test_prepare_pass_streams_extends_cache() {
        let device = device();
        device.prepare_pass_streams(2).unwrap();
        let first = device.pass_streams(1).unwrap();
        device.prepare_pass_streams(4).unwrap();
        device.prepare_pass_streams(1).unwrap();
        assert_eq!(device.cached_passes(), 4);
        assert_eq!(device.pass_streams(1).unwrap(), first);
    }

    #[test]
    fn test_query_passes_matches_pool() {
        let device = device();
        let indices = [0, 12, 13, 14, 15, 16];
        let passes = device.query_passes(&indices).unwrap();
        let pool = device.create_query_pool(&indices).unwrap();
        assert_eq!(passes, pool.pass_count());
    }

    #[test]
    fn test_new_stream_capacity() {
        let device = device().with_stream_capacity(128);
        assert_eq!(device.new_stream().capacity(), 128);
    }
}
