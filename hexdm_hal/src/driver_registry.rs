//! Name-to-factory table for mirror drivers.
//!
//! Built once at startup and passed by reference to `HardwareLink::open`.
//! The config's `dm.driver` string is looked up here.

use hexdm_common::dm::driver::{DmDriver, DriverError, DriverFactory};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Registered mirror drivers.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the drivers shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        if let Err(e) = crate::drivers::register_builtin(&mut registry) {
            warn!("Built-in driver registration incomplete: {}", e);
        }
        registry
    }

    /// Add `factory` under `name`.
    ///
    /// # Errors
    /// `DriverError::AlreadyRegistered` if `name` is taken; the existing
    /// factory is kept.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> Result<(), DriverError> {
        if self.factories.contains_key(name) {
            return Err(DriverError::AlreadyRegistered(name.to_string()));
        }
        self.factories.insert(name, factory);
        debug!(driver = name, "Driver registered");
        Ok(())
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate driver `name`.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn DmDriver>, DriverError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DriverError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// Registered names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexdm_common::dm::types::{ActuatorCommand, ActuatorMap};

    struct TestDriver;

    impl DmDriver for TestDriver {
        fn name(&self) -> &'static str {
            "test"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn connect(&mut self, _serial: &str) -> Result<(), DriverError> {
            Ok(())
        }

        fn actuator_count(&self) -> usize {
            0
        }

        fn load_actuator_map(&mut self) -> Result<ActuatorMap, DriverError> {
            Ok(ActuatorMap::identity(0))
        }

        fn send(&mut self, _command: &ActuatorCommand, _map: &ActuatorMap) -> Result<(), DriverError> {
            Ok(())
        }

        fn clear(&mut self) -> Result<(), DriverError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn create_test_driver() -> Box<dyn DmDriver> {
        Box::new(TestDriver)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = DriverRegistry::new();
        reg.register("test_driver", create_test_driver).unwrap();
        assert!(reg.contains("test_driver"));

        let driver = reg.create_driver("test_driver").expect("should create");
        assert_eq!(driver.name(), "test");
    }

    #[test]
    fn registry_driver_not_found() {
        let reg = DriverRegistry::new();
        let result = reg.create_driver("nonexistent");
        assert!(matches!(result, Err(DriverError::DriverNotFound(_))));
    }

    #[test]
    fn registry_builtin_has_simulation() {
        let reg = DriverRegistry::with_builtin();
        assert_eq!(reg.list_drivers(), vec!["simulation"]);
        assert_eq!(reg.create_driver("simulation").unwrap().name(), "simulation");
    }

    #[test]
    fn registry_duplicate_rejected() {
        let mut reg = DriverRegistry::with_builtin();
        assert!(matches!(
            reg.register("simulation", create_test_driver),
            Err(DriverError::AlreadyRegistered(name)) if name == "simulation"
        ));
        // Original factory survives.
        assert_eq!(reg.create_driver("simulation").unwrap().name(), "simulation");
        assert_eq!(reg.list_drivers(), vec!["simulation"]);
    }
}
