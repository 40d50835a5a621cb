//! Query pools
//!
//! A [`QueryPool`] is created for a fixed list of requested metrics. Creation
//! resolves registers, plans passes and rewrites each metric's operands to
//! result buffer offsets; Begin/End and result computation only read that
//! state.

use crate::alloc::RegisterSet;
use crate::catalog::MetricCatalog;
use crate::cmdstream::CommandStream;
use crate::device::{SideBuffer, PERF_CTR_MAX_PASSES};
use crate::emit::CommandEmitter;
use crate::error::Result;
use crate::hw::HwCaps;
use crate::reduce::{reduce, ResolvedMetric};
use crate::schedule::PassSchedule;
use std::sync::Arc;
use tally_shared::{MetricValue, QueryReport};
use tracing::info;

#[derive(Debug, Clone)]
pub struct QueryPool {
    catalog: Arc<MetricCatalog>,
    caps: Arc<HwCaps>,
    side: SideBuffer,
    metric_indices: Vec<u32>,
    registers: RegisterSet,
    schedule: PassSchedule,
    metrics: Vec<ResolvedMetric>,
}

impl QueryPool {
    /// Create a pool for `metric_indices`.
    ///
    /// Every index must be below `catalog.len()`; duplicates are allowed and
    /// yield duplicate results.
    pub fn new(
        catalog: Arc<MetricCatalog>,
        caps: Arc<HwCaps>,
        side: SideBuffer,
        metric_indices: &[u32],
    ) -> Result<Self> {
        let registers = RegisterSet::collect(&catalog, metric_indices)?;
        let schedule = PassSchedule::plan(&registers, &caps)?;
        debug_assert!(schedule.pass_count() <= PERF_CTR_MAX_PASSES);

        let mut metrics = Vec::new();
        metrics.try_reserve_exact(metric_indices.len())?;
        for &index in metric_indices {
            if let Some(desc) = catalog.get(index) {
                metrics.push(ResolvedMetric::resolve(index, desc, &schedule)?);
            }
        }

        let mut indices = Vec::new();
        indices.try_reserve_exact(metric_indices.len())?;
        indices.extend_from_slice(metric_indices);

        info!(
            "Created query pool: {} metrics, {} registers, {} passes, stride {} bytes",
            indices.len(),
            registers.len(),
            schedule.pass_count(),
            schedule.stride()
        );

        Ok(Self {
            catalog,
            caps,
            side,
            metric_indices: indices,
            registers,
            schedule,
            metrics,
        })
    }

    /// Times the workload must be replayed to collect every result
    pub fn pass_count(&self) -> u32 {
        self.schedule.pass_count()
    }

    /// Bytes of result buffer one query needs
    pub fn stride(&self) -> u32 {
        self.schedule.stride()
    }

    pub fn metric_indices(&self) -> &[u32] {
        &self.metric_indices
    }

    pub fn registers(&self) -> &RegisterSet {
        &self.registers
    }

    pub fn schedule(&self) -> &PassSchedule {
        &self.schedule
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    fn emitter(&self) -> CommandEmitter<'_> {
        CommandEmitter::new(&self.caps, &self.schedule, self.side)
    }

    /// Record the Begin sequence for a query whose results live at `va`.
    pub fn begin<S: CommandStream + ?Sized>(&self, cs: &mut S, va: u64) -> Result<()> {
        self.emitter().begin(cs, va)
    }

    /// Record the End sequence for a query whose results live at `va`.
    pub fn end<S: CommandStream + ?Sized>(&self, cs: &mut S, va: u64) -> Result<()> {
        self.emitter().end(cs, va)
    }

    /// Whether every pass has written its completion flag into `raw`
    pub fn is_available(&self, raw: &[u64]) -> bool {
        (0..self.pass_count()).all(|pass| {
            let word = (self.schedule.completion_flag_offset(pass) / 8) as usize;
            raw.get(word).copied().unwrap_or(0) != 0
        })
    }

    /// One value per requested metric, in request order.
    ///
    /// `raw` is one query's result buffer, read back as 64-bit words, and must
    /// span at least [`QueryPool::stride`] bytes.
    pub fn compute_results(&self, raw: &[u64]) -> Result<Vec<f64>> {
        debug_assert!(
            raw.len() * 8 >= self.stride() as usize,
            "result buffer of {} words is shorter than the {} byte stride",
            raw.len(),
            self.stride()
        );
        reduce(&self.metrics, raw)
    }

    /// Results with names and units attached
    pub fn report(&self, raw: &[u64]) -> Result<QueryReport> {
        let values = self.compute_results(raw)?;

        let mut named = Vec::new();
        named.try_reserve_exact(values.len())?;
        for (metric, value) in self.metrics.iter().zip(values) {
            if let Some(desc) = self.catalog.get(metric.index) {
                named.push(MetricValue {
                    index: metric.index,
                    name: desc.name.to_string(),
                    unit: desc.unit,
                    value,
                });
            }
        }

        Ok(QueryReport {
            available: self.is_available(raw),
            pass_count: self.pass_count(),
            values: named,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{BlockId, GfxLevel};
    use crate::metrics::CounterReg;

    fn pool(indices: &[u32]) -> QueryPool {
        let caps = HwCaps::preset(GfxLevel::Gfx10_3, 2, 8);
        let catalog = Arc::new(MetricCatalog::build(&caps).unwrap());
        QueryPool::new(catalog, Arc::new(caps), SideBuffer::new(0x1000), indices).unwrap()
    }

    /// Raw buffer where every instance of `reg` counted `delta`
    fn fill(pool: &QueryPool, raw: &mut [u64], reg: CounterReg, begin: u64, delta: u64) {
        let slot = pool.schedule().slot_of(&reg).unwrap();
        for i in 0..slot.instances as usize {
            let base = slot.offset as usize / 8 + 2 * i;
            raw[base] = begin;
            raw[base + 1] = begin + delta;
        }
    }

    fn buffer(pool: &QueryPool) -> Vec<u64> {
        vec![0; pool.stride() as usize / 8]
    }

    #[test]
    fn test_results_follow_request_order() {
        let pool = pool(&[1, 0, 1]);
        let mut raw = buffer(&pool);
        let caps = HwCaps::preset(GfxLevel::Gfx10_3, 2, 8);
        let waves = pool.catalog().get(1).unwrap().registers().next().unwrap();
        let cycles = pool.catalog().get(0).unwrap().registers().next().unwrap();
        fill(&pool, &mut raw, waves, 10, 5);
        fill(&pool, &mut raw, cycles, 100, 900);

        let values = pool.compute_results(&raw).unwrap();
        // SQ is read once per shader engine
        let ses = caps.instance_count(BlockId::Sq) as f64;
        assert_eq!(values, vec![5.0 * ses, 1000.0, 5.0 * ses]);
    }

    #[test]
    fn test_availability_needs_every_pass() {
        let pool = pool(&(1..=11).collect::<Vec<_>>());
        assert_eq!(pool.pass_count(), 2);
        let mut raw = buffer(&pool);
        assert!(!pool.is_available(&raw));

        let first = pool.schedule().completion_flag_offset(0) as usize / 8;
        raw[first] = 1;
        assert!(!pool.is_available(&raw));
        raw[first + 1] = 1;
        assert!(pool.is_available(&raw));
    }

    #[test]
    fn test_report_names_values() {
        let pool = pool(&[14, 14]);
        let mut raw = buffer(&pool);
        let desc = pool.catalog().get(14).unwrap();
        let regs: Vec<CounterReg> = desc.registers().collect();
        let instances = pool.schedule().slot_of(&regs[0]).unwrap().instances as u64;
        // 1 miss and 4 requests per instance
        fill(&pool, &mut raw, regs[0], 0, 1);
        fill(&pool, &mut raw, regs[1], 0, 4);
        let flag = pool.schedule().completion_flag_offset(0) as usize / 8;
        raw[flag] = 1;

        let report = pool.report(&raw).unwrap();
        assert!(report.available);
        assert_eq!(report.values.len(), 2);
        assert_eq!(report.values[0], report.values[1]);
        assert_eq!(report.value_of("L0 cache hit ratio"), Some(75.0));
        assert!(instances > 1);
    }

    #[test]
    fn test_empty_request() {
        let pool = pool(&[]);
        assert_eq!(pool.pass_count(), 1);
        assert_eq!(pool.stride(), 8);
        assert!(pool.compute_results(&[0]).unwrap().is_empty());
    }
}
