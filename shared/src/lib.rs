//! Shared types and utilities for Tally
//!
//! This crate contains the data structures exchanged between the counter
//! query library and its outer layers (CLI, readback tooling), plus the
//! capture file format used to hand raw result buffers between them.

pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{metric::*, report::*};
