//! Mirror geometry and channel-naming constants.
//!
//! These constants describe the reference hexagonal DM (169 segments,
//! 3 degrees of freedom each) and the driver command layout. They are the
//! single source of truth - all other crates should import from here.

use static_assertions::const_assert;

/// Number of segments on the reference mirror.
pub const NSEG: usize = 169;

/// Degrees of freedom per segment (piston, tip, tilt).
pub const NDOF: usize = 3;

/// Number of meaningful actuator values (`NDOF * NSEG`).
pub const NVACT: usize = NDOF * NSEG;

/// Length of the command array expected by the mirror driver.
pub const COMMAND_SIZE: usize = 1024;

const_assert!(NVACT <= COMMAND_SIZE);

/// Default number of virtual channels allocated at startup.
pub const DEFAULT_NCH: usize = 4;

/// Upper bound on virtual channels (keeps `ptt<NN>` names two digits wide).
pub const MAX_NCH: usize = 100;

/// Actuator pitch radius in microns.
pub const ACTUATOR_RADIUS_UM: f64 = 218.75;

/// Actuator gain (command units per nanometer of stroke).
pub const ACTUATOR_GAIN: f64 = 4000.0;

/// Serial number of the reference mirror.
pub const DEFAULT_SERIAL: &str = "27BW007#051";

/// Canonical service name (used for logging and segment prefixes).
pub const HEXDM_SERVICE_NAME: &str = "hexdm";

/// Default directory for channel segment files.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hexdm/hexdm.toml";

/// Base name of the combined channel segment.
pub const COMBINED_CHANNEL_NAME: &str = "ptt";

/// Segment name for virtual channel `index` (`ptt00`, `ptt01`, ...).
pub fn channel_name(index: usize) -> String {
    format!("{COMBINED_CHANNEL_NAME}{index:02}")
}
