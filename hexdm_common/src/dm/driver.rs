//! Mirror driver trait and error types.
//!
//! This module defines:
//! - `DmDriver` trait - Interface for pluggable mirror drivers
//! - `DriverError` enum - Error types for driver operations
//! - `DriverFactory` type alias - Factory function type
//! - `DriverDiagnostics` struct - Optional driver diagnostics

use crate::dm::types::{ActuatorCommand, ActuatorMap};
use serde::Serialize;
use thiserror::Error;

/// Error types for driver operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Device could not be opened
    #[error("Failed to open device {serial}: {reason}")]
    OpenFailed {
        /// Device identifier
        serial: String,
        /// Driver-reported reason
        reason: String,
    },

    /// Operation attempted on a closed device
    #[error("Device not connected")]
    NotConnected,

    /// Hardware rejected a command
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Actuator lookup table is inconsistent
    #[error("Invalid actuator map: {0}")]
    InvalidMap(String),

    /// Driver not found in registry
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// A driver with this name is already registered
    #[error("Driver already registered: {0}")]
    AlreadyRegistered(String),
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn DmDriver>;

/// Device-side counters, reported in the server status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverDiagnostics {
    /// Commands accepted by the device
    pub commands_sent: u64,
    /// Commands rejected by the device
    pub send_errors: u64,
    /// Number of actuators reported by the device
    pub actuator_count: usize,
}

/// Trait defining the interface for mirror drivers.
///
/// The hardware link manages drivers through this trait, so the vendor SDK
/// binding and the simulation driver are interchangeable.
///
/// # Lifecycle
///
/// 1. `connect()` - open the device by serial number
/// 2. `load_actuator_map()` - fetch the command-to-address lookup table
/// 3. `send()` - called by the combiner for every combined update
/// 4. `clear()` then `close()` - on shutdown
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `connect()` | None (startup) |
/// | `send()` | one wake interval |
/// | `clear()`/`close()` | None (shutdown) |
pub trait DmDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Open the device identified by `serial`.
    ///
    /// # Errors
    /// Return `DriverError::OpenFailed` if the device cannot be opened.
    fn connect(&mut self, serial: &str) -> Result<(), DriverError>;

    /// Number of actuators addressed by the device.
    fn actuator_count(&self) -> usize;

    /// Load the actuator lookup table from the device.
    fn load_actuator_map(&mut self) -> Result<ActuatorMap, DriverError>;

    /// Push one command array to the device, routed through `map`.
    ///
    /// Must not block longer than one combiner wake interval.
    fn send(&mut self, command: &ActuatorCommand, map: &ActuatorMap) -> Result<(), DriverError>;

    /// Drive every actuator to zero.
    fn clear(&mut self) -> Result<(), DriverError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), DriverError>;

    /// Device-side counters, if the driver keeps any.
    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        None
    }
}
