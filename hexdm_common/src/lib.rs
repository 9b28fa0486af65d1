//! HexDM Common Library
//!
//! This crate provides shared constants, mirror data types, configuration
//! loading utilities and the hardware driver contract for all HexDM
//! workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Mirror geometry and channel-naming constants
//! - [`config`] - Configuration loading traits and types
//! - [`dm`] - Deformable mirror types, server configuration and driver trait
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use hexdm_common::consts::*;
//! use hexdm_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod consts;
pub mod dm;
pub mod prelude;
