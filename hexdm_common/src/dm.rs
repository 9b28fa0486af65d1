//! Deformable mirror types, configuration and driver contract.
//!
//! - `types`: segment commands, actuator commands and the actuator map.
//! - `config`: the server configuration loaded from `hexdm.toml`.
//! - `driver`: the `DmDriver` trait consumed by the hardware link.

pub mod config;
pub mod driver;
pub mod types;
