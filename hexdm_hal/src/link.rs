//! Hardware link between the combiner and a mirror driver.
//!
//! A link is either *simulated* (no driver, every hardware call skipped) or
//! *connected* (driver opened by serial number, actuator map loaded). The
//! combiner only ever calls `send`; the control surface calls `shutdown` on
//! quit.

use crate::driver_registry::DriverRegistry;
use hexdm_common::dm::driver::{DmDriver, DriverDiagnostics, DriverError};
use hexdm_common::dm::types::{ActuatorCommand, ActuatorMap};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Send counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Commands accepted by the driver
    pub commands_sent: u64,
    /// Commands the driver rejected
    pub send_errors: u64,
    /// Commands dropped because the link is simulated
    pub skipped: u64,
}

/// Connected or simulated mirror link.
pub struct HardwareLink {
    driver: Option<Box<dyn DmDriver>>,
    map: Option<ActuatorMap>,
    driver_name: &'static str,
    serial: String,
    simulated: bool,
    stats: LinkStats,
}

impl HardwareLink {
    /// Link that skips every hardware call.
    pub fn simulated(serial: &str) -> Self {
        info!("Hardware link in simulation mode, no commands will reach {}", serial);
        Self {
            driver: None,
            map: None,
            driver_name: "none",
            serial: serial.to_string(),
            simulated: true,
            stats: LinkStats::default(),
        }
    }

    /// Create driver `name` from `registry` and connect it.
    pub fn open(registry: &DriverRegistry, name: &str, serial: &str) -> Result<Self, DriverError> {
        let driver = registry.create_driver(name)?;
        Self::connect(driver, serial)
    }

    /// Connect `driver` to device `serial` and load its actuator map.
    pub fn connect(mut driver: Box<dyn DmDriver>, serial: &str) -> Result<Self, DriverError> {
        driver.connect(serial)?;

        let map = match driver.load_actuator_map() {
            Ok(map) => map,
            Err(e) => {
                if let Err(close_err) = driver.close() {
                    warn!("Closing {} after failed map load: {}", serial, close_err);
                }
                return Err(e);
            }
        };

        info!(
            "Connected to mirror {} via {} v{} ({} actuators, map of {})",
            serial,
            driver.name(),
            driver.version(),
            driver.actuator_count(),
            map.len()
        );

        Ok(Self {
            driver_name: driver.name(),
            driver: Some(driver),
            map: Some(map),
            serial: serial.to_string(),
            simulated: false,
            stats: LinkStats::default(),
        })
    }

    /// Push one command to the device. A no-op in simulation mode.
    pub fn send(&mut self, command: &ActuatorCommand) -> Result<(), DriverError> {
        if self.simulated {
            self.stats.skipped += 1;
            return Ok(());
        }
        let (Some(driver), Some(map)) = (self.driver.as_mut(), self.map.as_ref()) else {
            return Err(DriverError::NotConnected);
        };
        match driver.send(command, map) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e)
            }
        }
    }

    /// Clear and close the device, then release the actuator map.
    ///
    /// Idempotent; a simulated link has nothing to release.
    pub fn shutdown(&mut self) -> Result<(), DriverError> {
        self.map = None;
        let Some(mut driver) = self.driver.take() else {
            return Ok(());
        };

        let cleared = driver.clear();
        if let Err(e) = &cleared {
            warn!("Failed to clear mirror {}: {}", self.serial, e);
        }
        let closed = driver.close();
        debug!("Mirror {} released", self.serial);
        cleared.and(closed)
    }

    /// True when hardware calls are skipped.
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// True while a driver is held.
    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }

    /// Name of the connected driver, `"none"` when simulated.
    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    /// Device serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Loaded actuator map, if connected.
    pub fn actuator_map(&self) -> Option<&ActuatorMap> {
        self.map.as_ref()
    }

    /// Send counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Counters kept by the driver itself. `None` when simulated or released.
    pub fn diagnostics(&self) -> Option<DriverDiagnostics> {
        self.driver.as_ref().and_then(|driver| driver.diagnostics())
    }
}
