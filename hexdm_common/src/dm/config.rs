//! Server configuration types.
//!
//! This module contains the configuration loaded from `hexdm.toml`:
//! - `HexDmConfig` - top-level file
//! - `DmConfig` - device identity, geometry and driver selection
//! - `ChannelConfig` - channel count and segment placement
//! - `CombinerConfig` - wake strategy and interval
//! - `TransformConfig` - PTT to actuator conversion constants
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::config::{ConfigError, ConfigLoader, SharedConfig};
use crate::consts::{
    ACTUATOR_GAIN, ACTUATOR_RADIUS_UM, COMMAND_SIZE, DEFAULT_NCH, DEFAULT_SERIAL, DEFAULT_SHM_DIR,
    MAX_NCH, NDOF, NSEG,
};
use crate::prelude::DEFAULT_WAKE_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_serial() -> String {
    DEFAULT_SERIAL.to_string()
}

fn default_nseg() -> usize {
    NSEG
}

fn default_true() -> bool {
    true
}

fn default_driver() -> String {
    "simulation".to_string()
}

fn default_nch() -> usize {
    DEFAULT_NCH
}

fn default_max_nch() -> usize {
    MAX_NCH
}

fn default_shm_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SHM_DIR)
}

fn default_wake_interval_ms() -> u64 {
    DEFAULT_WAKE_INTERVAL_MS
}

fn default_radius() -> f64 {
    ACTUATOR_RADIUS_UM
}

fn default_gain() -> f64 {
    ACTUATOR_GAIN
}

fn default_command_size() -> usize {
    COMMAND_SIZE
}

/// Top-level configuration loaded from `hexdm.toml`.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "hexdm"
///
/// [dm]
/// serial = "27BW007#051"
/// simulate = false
/// driver = "simulation"
///
/// [channels]
/// default_nch = 4
///
/// [combiner]
/// wake_mode = "event"
/// wake_interval_ms = 50
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HexDmConfig {
    /// Settings shared by every HexDM process.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Mirror identity and driver selection.
    #[serde(default)]
    pub dm: DmConfig,

    /// Channel set sizing and placement.
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Control loop wake policy.
    #[serde(default)]
    pub combiner: CombinerConfig,

    /// PTT to actuator conversion.
    #[serde(default)]
    pub transform: TransformConfig,
}

impl ConfigLoader for HexDmConfig {}

impl HexDmConfig {
    /// Validate the whole configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` not empty
    /// 2. `dm.nseg` > 0 and `NDOF * nseg` <= `transform.command_size`
    /// 3. `1 <= channels.default_nch <= channels.max_nch <= MAX_NCH`
    /// 4. `combiner.wake_interval_ms` > 0
    /// 5. `transform.gain` finite and non-zero, radius finite
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.dm.validate()?;
        self.channels.validate()?;
        self.combiner.validate()?;
        self.transform.validate()?;

        let nvact = NDOF * self.dm.nseg;
        if nvact > self.transform.command_size {
            return Err(ConfigError::ValidationError(format!(
                "{} segments need {} actuator values, command_size is {}",
                self.dm.nseg, nvact, self.transform.command_size
            )));
        }
        Ok(())
    }
}

/// Device identity, geometry and driver selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmConfig {
    /// Serial number passed to the driver on connect.
    #[serde(default = "default_serial")]
    pub serial: String,

    /// Number of mirror segments.
    #[serde(default = "default_nseg")]
    pub nseg: usize,

    /// Skip every hardware call (no connect, no send).
    #[serde(default = "default_true")]
    pub simulate: bool,

    /// Registered driver used when `simulate` is false.
    #[serde(default = "default_driver")]
    pub driver: String,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            nseg: default_nseg(),
            simulate: true,
            driver: default_driver(),
        }
    }
}

impl DmConfig {
    /// Validate device settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nseg == 0 {
            return Err(ConfigError::ValidationError(
                "dm.nseg must be greater than 0".to_string(),
            ));
        }
        if !self.simulate && self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "dm.driver cannot be empty outside simulation mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of meaningful actuator values.
    pub fn nvact(&self) -> usize {
        NDOF * self.nseg
    }
}

/// Channel set sizing and segment file placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Channel count allocated at startup.
    #[serde(default = "default_nch")]
    pub default_nch: usize,

    /// Largest channel count accepted by `set_nch`.
    #[serde(default = "default_max_nch")]
    pub max_nch: usize,

    /// Directory holding the segment files.
    #[serde(default = "default_shm_dir")]
    pub shm_dir: PathBuf,

    /// Optional prefix prepended to every segment name.
    #[serde(default)]
    pub prefix: String,

    /// Allocate `default_nch` channels before the first command.
    #[serde(default = "default_true")]
    pub allocate_on_startup: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_nch: default_nch(),
            max_nch: default_max_nch(),
            shm_dir: default_shm_dir(),
            prefix: String::new(),
            allocate_on_startup: true,
        }
    }
}

impl ChannelConfig {
    /// Validate channel settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_nch == 0 || self.max_nch > MAX_NCH {
            return Err(ConfigError::ValidationError(format!(
                "channels.max_nch must be in 1..={MAX_NCH}, got {}",
                self.max_nch
            )));
        }
        if self.default_nch == 0 || self.default_nch > self.max_nch {
            return Err(ConfigError::ValidationError(format!(
                "channels.default_nch must be in 1..={}, got {}",
                self.max_nch, self.default_nch
            )));
        }
        if self.prefix.contains('/') {
            return Err(ConfigError::ValidationError(
                "channels.prefix cannot contain '/'".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the combiner notices channel updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeMode {
    /// Wake on a fixed interval and compare version counters.
    #[default]
    Poll,
    /// Block on the channel set doorbell, bounded by the interval.
    Event,
}

/// Control loop wake policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CombinerConfig {
    /// Wake strategy.
    #[serde(default)]
    pub wake_mode: WakeMode,

    /// Poll period, and the upper bound on an event wait.
    #[serde(default = "default_wake_interval_ms")]
    pub wake_interval_ms: u64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            wake_mode: WakeMode::default(),
            wake_interval_ms: default_wake_interval_ms(),
        }
    }
}

impl CombinerConfig {
    /// Validate wake settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wake_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "combiner.wake_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Wake interval as Duration.
    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }
}

/// PTT to actuator conversion constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    /// Actuator pitch radius [um].
    #[serde(default = "default_radius")]
    pub actuator_radius_um: f64,

    /// Actuator gain (divisor applied to every drive value).
    #[serde(default = "default_gain")]
    pub gain: f64,

    /// Length of the driver command array.
    #[serde(default = "default_command_size")]
    pub command_size: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            actuator_radius_um: default_radius(),
            gain: default_gain(),
            command_size: default_command_size(),
        }
    }
}

impl TransformConfig {
    /// Validate conversion constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gain.is_finite() || self.gain == 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "transform.gain must be finite and non-zero, got {}",
                self.gain
            )));
        }
        if !self.actuator_radius_um.is_finite() {
            return Err(ConfigError::ValidationError(
                "transform.actuator_radius_um must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
