//! Error types for channel segment operations

use thiserror::Error;

/// Errors that can occur during channel segment operations
#[derive(Error, Debug)]
pub enum ShmError {
    /// Segment already exists and its creator is still alive
    #[error("Segment already exists: {name} (creator pid {pid})")]
    AlreadyExists {
        /// Segment name
        name: String,
        /// Process that created the segment
        pid: u32,
    },

    /// Segment not found
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Channel index outside the channel set
    #[error("Invalid channel {index} (valid: 0..{limit})")]
    InvalidChannel {
        /// Requested index
        index: usize,
        /// Exclusive upper bound for the attempted operation
        limit: usize,
    },

    /// Data length does not match the channel shape
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch {
        /// Values per channel
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// Requested geometry cannot be allocated
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Torn read persisted past the retry budget
    #[error("Version conflict on {name} - writer kept the segment busy")]
    VersionConflict {
        /// Segment name
        name: String,
    },

    /// Channel set was destroyed while this handle was still held
    #[error("Channel set destroyed ({nch} channels)")]
    Destroyed {
        /// Virtual channel count of the destroyed set
        nch: usize,
    },

    /// Segment header no longer validates
    #[error("Segment corrupted: {name}: {reason}")]
    Corrupted {
        /// Segment name
        name: String,
        /// What failed to validate
        reason: String,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for channel segment operations
pub type ShmResult<T> = Result<T, ShmError>;
