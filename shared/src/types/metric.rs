//! Metric description types
//!
//! These describe catalog entries to callers that only need names and units,
//! without the combination formula or register operands.

use serde::{Deserialize, Serialize};

/// Unit a metric's final value is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Generic,
    Percentage,
    Bytes,
    Cycles,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Generic => "generic",
            Unit::Percentage => "percentage",
            Unit::Bytes => "bytes",
            Unit::Cycles => "cycles",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Public description of one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInfo {
    /// Catalog index (stable across releases)
    pub index: u32,

    pub name: String,
    pub category: String,
    pub description: String,
    pub unit: Unit,

    /// Hex form of the metric's 16-byte UUID
    pub uuid: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_serde_names() {
        assert_eq!(serde_json::to_string(&Unit::Percentage).unwrap(), "\"percentage\"");
        let unit: Unit = serde_json::from_str("\"bytes\"").unwrap();
        assert_eq!(unit, Unit::Bytes);
        assert_eq!(Unit::Cycles.to_string(), "cycles");
    }
}
