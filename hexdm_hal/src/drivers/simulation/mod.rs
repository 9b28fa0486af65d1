//! Simulation driver module.
//!
//! A software mirror that accepts commands like the real device and keeps
//! the last driven array for inspection.

mod driver;

pub use driver::{SimulationDriver, SimulationProbe};

use hexdm_common::dm::driver::DmDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn DmDriver> {
    Box::new(SimulationDriver::new())
}
