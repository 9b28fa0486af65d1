//! # HexDM HAL Library
//!
//! Hardware side of the HexDM server: the driver registry, the built-in
//! simulation driver and the `HardwareLink` that the combiner pushes
//! actuator commands through.
//!
//! Drivers implement the `DmDriver` trait defined in `hexdm_common::dm::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations
//! - [`link`] - Connected or simulated hardware link
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         hexdm_hal                            │
//! │  ┌──────────────┐    ┌──────────────┐    ┌────────────────┐  │
//! │  │ HardwareLink │◄──►│  DmDriver    │◄───│ DriverRegistry │  │
//! │  │ (map + stats)│    │ (trait obj)  │    │  (factories)   │  │
//! │  └──────────────┘    └──────────────┘    └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;
pub mod link;

pub use crate::driver_registry::DriverRegistry;
pub use crate::link::{HardwareLink, LinkStats};
