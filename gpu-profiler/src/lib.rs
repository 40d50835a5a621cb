//! GPU hardware performance counter queries
//!
//! Turns a list of requested metric indices into command stream sequences
//! that select, sample and read back hardware counter registers, and reduces
//! the read-back values into one number per metric.
//!
//! ```text
//! MetricCatalog -> RegisterSet -> PassSchedule -> CommandEmitter (Begin/End)
//!                                              -> ResolvedMetric -> reduce
//! ```
//!
//! Hardware blocks can only sample a few registers at once, so a query may
//! need the workload replayed several times. [`QueryPool::pass_count`] says how
//! many; the caller brackets replay `p` with [`Device::pass_streams`]`(p)`.

pub mod alloc;
pub mod catalog;
pub mod cmdstream;
pub mod device;
pub mod emit;
pub mod error;
pub mod hw;
pub mod metrics;
pub mod pool;
pub mod reduce;
pub mod schedule;

pub use catalog::{Enumeration, MetricCatalog};
pub use cmdstream::{CommandStream, PacketStream};
pub use device::{Device, PassStreams, SideBuffer};
pub use error::{Error, Result};
pub use hw::{BlockCaps, BlockId, GfxLevel, HwCaps};
pub use pool::QueryPool;
