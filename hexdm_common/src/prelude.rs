//! Prelude module for common re-exports.
//!
//! ```rust
//! use hexdm_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::dm::config::{ChannelConfig, CombinerConfig, DmConfig, HexDmConfig, TransformConfig, WakeMode};

// ─── Geometry ───────────────────────────────────────────────────────
pub use crate::consts::{COMMAND_SIZE, DEFAULT_NCH, NDOF, NSEG};
pub use crate::dm::types::{ActuatorCommand, ActuatorMap, SegmentPtt};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::dm::driver::{DmDriver, DriverError, DriverFactory};

/// Default combiner wake interval in milliseconds.
pub const DEFAULT_WAKE_INTERVAL_MS: u64 = 100;

/// Default combiner wake interval as Duration.
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(DEFAULT_WAKE_INTERVAL_MS);
