//! Simulation driver implementation.
//!
//! `SimulationDriver` implements `DmDriver` without hardware. Commands are
//! scattered through the actuator map into a driver-order array exactly as
//! the device would receive them. A `SimulationProbe` shares that state so
//! tests can inspect it and inject send failures after the driver has been
//! boxed.

use hexdm_common::consts::COMMAND_SIZE;
use hexdm_common::dm::driver::{DmDriver, DriverDiagnostics, DriverError};
use hexdm_common::dm::types::{ActuatorCommand, ActuatorMap};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SimulatedMirror {
    serial: Option<String>,
    output: Vec<f64>,
    commands_sent: u64,
    send_errors: u64,
    clears: u64,
    fail_sends: bool,
}

/// Simulation driver implementing the DmDriver trait.
pub struct SimulationDriver {
    name: &'static str,
    version: &'static str,
    actuator_count: usize,
    map: ActuatorMap,
    mirror: Arc<Mutex<SimulatedMirror>>,
}

impl SimulationDriver {
    /// Create a driver with `COMMAND_SIZE` actuators and an identity map.
    pub fn new() -> Self {
        Self::with_map(ActuatorMap::identity(COMMAND_SIZE))
    }

    /// Create a driver that reports `map` from `load_actuator_map`.
    pub fn with_map(map: ActuatorMap) -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            actuator_count: COMMAND_SIZE,
            map,
            mirror: Arc::new(Mutex::new(SimulatedMirror::default())),
        }
    }

    /// Shared view of the simulated device.
    pub fn probe(&self) -> SimulationProbe {
        SimulationProbe {
            mirror: Arc::clone(&self.mirror),
        }
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DmDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn connect(&mut self, serial: &str) -> Result<(), DriverError> {
        if serial.is_empty() {
            return Err(DriverError::OpenFailed {
                serial: serial.to_string(),
                reason: "empty serial number".to_string(),
            });
        }
        let mut mirror = self.mirror.lock();
        mirror.serial = Some(serial.to_string());
        mirror.output = vec![0.0; self.actuator_count];
        info!("Simulated mirror {} opened ({} actuators)", serial, self.actuator_count);
        Ok(())
    }

    fn actuator_count(&self) -> usize {
        self.actuator_count
    }

    fn load_actuator_map(&mut self) -> Result<ActuatorMap, DriverError> {
        if self.mirror.lock().serial.is_none() {
            return Err(DriverError::NotConnected);
        }
        Ok(self.map.clone())
    }

    fn send(&mut self, command: &ActuatorCommand, map: &ActuatorMap) -> Result<(), DriverError> {
        let mut mirror = self.mirror.lock();
        if mirror.serial.is_none() {
            return Err(DriverError::NotConnected);
        }
        if mirror.fail_sends {
            mirror.send_errors += 1;
            return Err(DriverError::CommunicationError(
                "simulated transfer failure".to_string(),
            ));
        }
        map.scatter(command, &mut mirror.output)?;
        mirror.commands_sent += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DriverError> {
        let mut mirror = self.mirror.lock();
        if mirror.serial.is_none() {
            return Err(DriverError::NotConnected);
        }
        mirror.output.fill(0.0);
        mirror.clears += 1;
        debug!("Simulated mirror cleared");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(serial) = self.mirror.lock().serial.take() {
            info!("Simulated mirror {} closed", serial);
        }
        Ok(())
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        let mirror = self.mirror.lock();
        Some(DriverDiagnostics {
            commands_sent: mirror.commands_sent,
            send_errors: mirror.send_errors,
            actuator_count: self.actuator_count,
        })
    }
}

/// Inspection handle onto a `SimulationDriver`'s device state.
#[derive(Clone)]
pub struct SimulationProbe {
    mirror: Arc<Mutex<SimulatedMirror>>,
}

impl SimulationProbe {
    /// True between `connect` and `close`.
    pub fn is_connected(&self) -> bool {
        self.mirror.lock().serial.is_some()
    }

    /// Last driven array in driver address order.
    pub fn output(&self) -> Vec<f64> {
        self.mirror.lock().output.clone()
    }

    /// Commands accepted so far.
    pub fn commands_sent(&self) -> u64 {
        self.mirror.lock().commands_sent
    }

    /// Number of `clear` calls.
    pub fn clears(&self) -> u64 {
        self.mirror.lock().clears
    }

    /// Make every following `send` fail with a communication error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.mirror.lock().fail_sends = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_connect() {
        let mut driver = SimulationDriver::new();
        let map = ActuatorMap::identity(COMMAND_SIZE);
        let cmd = ActuatorCommand::zeroed(COMMAND_SIZE, 507);
        assert!(matches!(driver.send(&cmd, &map), Err(DriverError::NotConnected)));
        assert!(matches!(driver.load_actuator_map(), Err(DriverError::NotConnected)));
    }

    #[test]
    fn test_send_scatters_through_map() {
        let lut: Vec<u32> = (0..4).rev().collect();
        let map = ActuatorMap::from_lut(lut, 4).unwrap();
        let mut driver = SimulationDriver::with_map(map);
        let probe = driver.probe();

        driver.connect("SIM").unwrap();
        let map = driver.load_actuator_map().unwrap();

        let mut cmd = ActuatorCommand::zeroed(4, 4);
        cmd.values_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        driver.send(&cmd, &map).unwrap();

        assert_eq!(&probe.output()[..4], &[4.0, 3.0, 2.0, 1.0]);
        assert_eq!(probe.commands_sent(), 1);
    }

    #[test]
    fn test_injected_failure_counted() {
        let mut driver = SimulationDriver::new();
        let probe = driver.probe();
        driver.connect("SIM").unwrap();
        let map = driver.load_actuator_map().unwrap();
        let cmd = ActuatorCommand::zeroed(COMMAND_SIZE, 507);

        probe.set_fail_sends(true);
        assert!(matches!(
            driver.send(&cmd, &map),
            Err(DriverError::CommunicationError(_))
        ));
        let diag = driver.diagnostics().unwrap();
        assert_eq!(diag.send_errors, 1);
        assert_eq!(diag.commands_sent, 0);
    }

    #[test]
    fn test_clear_and_close() {
        let mut driver = SimulationDriver::new();
        let probe = driver.probe();
        driver.connect("SIM").unwrap();
        driver.clear().unwrap();
        driver.close().unwrap();

        assert_eq!(probe.clears(), 1);
        assert!(!probe.is_connected());
        assert!(driver.clear().is_err());
        assert!(driver.close().is_ok());
    }

    #[test]
    fn test_empty_serial_rejected() {
        let mut driver = SimulationDriver::new();
        assert!(matches!(
            driver.connect(""),
            Err(DriverError::OpenFailed { .. })
        ));
    }
}
