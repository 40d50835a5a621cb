//! Query result reports

use super::metric::Unit;
use serde::{Deserialize, Serialize};

/// Final value of one requested metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub index: u32,
    pub name: String,
    pub unit: Unit,
    pub value: f64,
}

/// Reduced results of one query, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    /// Every pass wrote its completion flag
    pub available: bool,

    pub pass_count: u32,

    pub values: Vec<MetricValue>,
}

impl QueryReport {
    /// Find the first value reported for a metric name
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|v| v.name == name).map(|v| v.value)
    }
}
