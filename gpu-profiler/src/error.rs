//! Error types for the counter query subsystem

use crate::hw::BlockId;
use thiserror::Error;

/// Errors surfaced by catalog construction, pool creation and command emission.
///
/// Invalid metric indices and similar caller mistakes are not represented
/// here; they are checked with debug assertions only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Host memory for descriptors, register lists or results could not be allocated.
    #[error("out of host memory")]
    OutOfMemory,

    /// The device exposes no counter blocks, so no catalog can be built.
    #[error("no hardware counter blocks available on this device")]
    HardwareCapabilityUnavailable,

    /// The capability table describes a block that cannot be programmed.
    #[error("invalid capabilities for counter block {block}: {reason}")]
    InvalidCapability { block: BlockId, reason: &'static str },

    /// A command stream could not reserve the dwords an emission needs.
    #[error("command stream full: requested {requested} dwords, {available} available")]
    CommandStreamFull { requested: usize, available: usize },
}

impl Error {
    /// Whether this error is an allocation failure from the caller's point of view.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory | Error::CommandStreamFull { .. })
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_full_counts_as_oom() {
        let err = Error::CommandStreamFull {
            requested: 10,
            available: 2,
        };
        assert!(err.is_out_of_memory());
        assert!(Error::OutOfMemory.is_out_of_memory());
        assert!(!Error::HardwareCapabilityUnavailable.is_out_of_memory());
    }

    #[test]
    fn test_try_reserve_maps_to_oom() {
        let mut v: Vec<u64> = Vec::new();
        let err: Error = v.try_reserve(usize::MAX).unwrap_err().into();
        assert_eq!(err, Error::OutOfMemory);
    }
}
