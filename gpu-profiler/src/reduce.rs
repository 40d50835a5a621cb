//! Result reduction
//!
//! Turns the raw begin/end counter pairs read back after all passes into one
//! value per requested metric. Operands are resolved to buffer offsets when the
//! pool is created, so reduction never looks at register identity.

use crate::error::Result;
use crate::metrics::{Combination, MetricDescriptor, OperandRef};
use crate::schedule::PassSchedule;

/// Metric operand with its register replaced by a result buffer location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedOperand {
    Counter { offset: u32, instances: u32 },
    Constant(i64),
}

/// A requested metric ready for evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetric {
    /// Catalog index
    pub index: u32,
    pub combination: Combination,
    pub operands: Vec<ResolvedOperand>,
}

impl ResolvedMetric {
    /// Resolve a descriptor's operands against a pool's buffer layout.
    pub fn resolve(index: u32, desc: &MetricDescriptor, schedule: &PassSchedule) -> Result<Self> {
        let mut operands = Vec::new();
        operands.try_reserve_exact(desc.operands.len())?;

        operands.extend(desc.operands.iter().map(|op| match op {
            OperandRef::Constant(value) => ResolvedOperand::Constant(*value),
            OperandRef::Register(reg) => match schedule.slot_of(reg) {
                Some(slot) => ResolvedOperand::Counter {
                    offset: slot.offset,
                    instances: slot.instances,
                },
                // A register outside the schedule reads as zero
                None => ResolvedOperand::Counter {
                    offset: 0,
                    instances: 0,
                },
            },
        }));

        Ok(Self {
            index,
            combination: desc.combination,
            operands,
        })
    }

    fn sum_at(&self, i: usize, raw: &[u64]) -> f64 {
        self.operands.get(i).map(|op| op.sum(raw)).unwrap_or(0.0)
    }

    /// Evaluate the metric over one query slot's raw words
    pub fn evaluate(&self, raw: &[u64]) -> f64 {
        match self.combination {
            Combination::Sum => self.operands.iter().map(|op| op.sum(raw)).sum::<f64>(),
            Combination::Max => self
                .operands
                .iter()
                .map(|op| op.max_end(raw))
                .fold(0.0, f64::max),
            Combination::RatioDivScale => {
                self.sum_at(0, raw) / self.sum_at(1, raw) / self.sum_at(2, raw) * 100.0
            }
            Combination::ReverseRatio => {
                let total = self.sum_at(1, raw);
                (total - self.sum_at(0, raw)) / total * 100.0
            }
            Combination::SumWeighted4 => (0..4)
                .map(|i| self.sum_at(2 * i, raw) * self.sum_at(2 * i + 1, raw))
                .sum::<f64>(),
        }
    }
}

fn word(raw: &[u64], index: usize) -> u64 {
    raw.get(index).copied().unwrap_or(0)
}

impl ResolvedOperand {
    /// Sum of `end - begin` over all instances (the literal for constants)
    pub fn sum(&self, raw: &[u64]) -> f64 {
        match *self {
            ResolvedOperand::Constant(value) => value as f64,
            ResolvedOperand::Counter { offset, instances } => {
                let base = offset as usize / 8;
                let total = (0..instances as usize).fold(0u64, |acc, i| {
                    let begin = word(raw, base + 2 * i);
                    let end = word(raw, base + 2 * i + 1);
                    acc.wrapping_add(end.wrapping_sub(begin))
                });
                total as f64
            }
        }
    }

    /// Largest raw end value over all instances (the literal for constants)
    pub fn max_end(&self, raw: &[u64]) -> f64 {
        match *self {
            ResolvedOperand::Constant(value) => value as f64,
            ResolvedOperand::Counter { offset, instances } => {
                let base = offset as usize / 8;
                (0..instances as usize)
                    .map(|i| word(raw, base + 2 * i + 1))
                    .max()
                    .unwrap_or(0) as f64
            }
        }
    }
}

/// Evaluate every metric, in order.
pub fn reduce(metrics: &[ResolvedMetric], raw: &[u64]) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    values.try_reserve_exact(metrics.len())?;
    values.extend(metrics.iter().map(|m| m.evaluate(raw)));
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(offset: u32, instances: u32) -> ResolvedOperand {
        ResolvedOperand::Counter { offset, instances }
    }

    fn metric(combination: Combination, operands: Vec<ResolvedOperand>) -> ResolvedMetric {
        ResolvedMetric {
            index: 0,
            combination,
            operands,
        }
    }

    #[test]
    fn test_sum_across_instances() {
        // two instances: (5 -> 9), (1 -> 4)
        let raw = [5, 9, 1, 4];
        let m = metric(Combination::Sum, vec![counter(0, 2)]);
        assert_eq!(m.evaluate(&raw), 7.0);
    }

    #[test]
    fn test_max_uses_end_values() {
        let raw = [100, 150, 0, 120, 0, 40];
        let m = metric(Combination::Max, vec![counter(0, 2), counter(32, 1)]);
        assert_eq!(m.evaluate(&raw), 150.0);
    }

    #[test]
    fn test_ratio_div_scale() {
        // register sums 10, 2, 5
        let raw = [0, 10, 0, 2, 0, 5];
        let m = metric(
            Combination::RatioDivScale,
            vec![counter(0, 1), counter(16, 1), counter(32, 1)],
        );
        assert_eq!(m.evaluate(&raw), 100.0);
    }

    #[test]
    fn test_reverse_ratio() {
        // misses 3, requests 12
        let raw = [7, 10, 8, 20];
        let m = metric(Combination::ReverseRatio, vec![counter(0, 1), counter(16, 1)]);
        assert_eq!(m.evaluate(&raw), 75.0);
    }

    #[test]
    fn test_sum_weighted_4() {
        let raw = [0, 4, 0, 2];
        let m = metric(
            Combination::SumWeighted4,
            vec![
                counter(0, 1),
                ResolvedOperand::Constant(32),
                counter(16, 1),
                ResolvedOperand::Constant(64),
                ResolvedOperand::Constant(0),
                ResolvedOperand::Constant(0),
                ResolvedOperand::Constant(0),
                ResolvedOperand::Constant(0),
            ],
        );
        assert_eq!(m.evaluate(&raw), 256.0);
    }

    #[test]
    fn test_zero_instances_contribute_nothing() {
        let raw: [u64; 0] = [];
        let sum = metric(Combination::Sum, vec![counter(4096, 0)]);
        let max = metric(Combination::Max, vec![counter(4096, 0)]);
        assert_eq!(sum.evaluate(&raw), 0.0);
        assert_eq!(max.evaluate(&raw), 0.0);
    }

    #[test]
    fn test_counter_wraparound() {
        let raw = [u64::MAX - 1, 3];
        let m = metric(Combination::Sum, vec![counter(0, 1)]);
        assert_eq!(m.evaluate(&raw), 5.0);
    }

    #[test]
    fn test_reduce_is_pure() {
        let raw = [1, 5, 2, 8];
        let metrics = vec![
            metric(Combination::Sum, vec![counter(0, 2)]),
            metric(Combination::Sum, vec![counter(0, 2)]),
        ];
        let a = reduce(&metrics, &raw).unwrap();
        let b = reduce(&metrics, &raw).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec![10.0, 10.0]);
    }
}
