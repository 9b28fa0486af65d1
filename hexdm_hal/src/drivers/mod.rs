//! Mirror driver implementations.
//!
//! - [`simulation`] - Software mirror for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `DmDriver` trait from `hexdm_common::dm::driver`
//! 3. Register the driver in `register_builtin()`

pub mod simulation;

use crate::driver_registry::DriverRegistry;
use hexdm_common::dm::driver::DriverError;

/// Register all built-in drivers.
pub fn register_builtin(registry: &mut DriverRegistry) -> Result<(), DriverError> {
    registry.register("simulation", simulation::create_driver)
}
