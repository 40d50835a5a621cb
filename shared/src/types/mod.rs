//! Data types shared across Tally crates

pub mod metric;
pub mod report;
