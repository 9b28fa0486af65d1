//! Control surface errors.

use hexdm_common::config::ConfigError;
use hexdm_common::dm::driver::DriverError;
use hexdm_shared_memory::ShmError;
use thiserror::Error;

/// Errors returned by `DmServer` operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No channel set exists yet
    #[error("Channels not allocated, set the desired number of channels first")]
    NotAllocated,

    /// Reset index outside the virtual channels
    #[error("Invalid channel {index} (valid: 0..{nch}, or negative for all)")]
    InvalidChannel {
        /// Requested index
        index: i64,
        /// Current channel count
        nch: usize,
    },

    /// Requested channel count not in `1..=max`
    #[error("Invalid channel count {requested} (valid: 1..={max})")]
    InvalidChannelCount {
        /// Requested count
        requested: i64,
        /// Configured maximum
        max: usize,
    },

    /// Channel set reallocation failed
    #[error("Failed to allocate {requested} channels (previous set restored: {restored}): {source}")]
    AllocationFailure {
        /// Requested count
        requested: usize,
        /// Whether the previous set was re-created
        restored: bool,
        /// Underlying segment error
        source: ShmError,
    },

    /// Shared memory error
    #[error("Shared memory error: {0}")]
    Shm(#[from] ShmError),

    /// Hardware error
    #[error("Hardware error: {0}")]
    Driver(#[from] DriverError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Combiner thread could not be spawned
    #[error("Failed to spawn combiner thread: {0}")]
    Spawn(#[from] std::io::Error),
}
