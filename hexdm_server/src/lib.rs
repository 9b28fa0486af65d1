//! # HexDM Server Library
//!
//! Control server for a segmented (hexagonal) deformable mirror. Clients
//! write piston/tip/tilt commands into shared-memory channels; the server
//! sums the channels, publishes the sum, converts it to actuator drive
//! values and sends them to the mirror.
//!
//! # Module Structure
//!
//! - [`transform`] - PTT to actuator conversion
//! - [`lifecycle`] - Channel set allocation and teardown
//! - [`combiner`] - Control loop thread and its statistics
//! - [`server`] - `DmServer` control surface
//! - [`console`] - Command parsing and execution
//! - [`error`] - `ServerError`
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────────────────────────┐
//! │  console   │──►│                  DmServer                    │
//! └────────────┘   │  ┌───────────┐  ┌───────────┐  ┌───────────┐ │
//!                  │  │ Lifecycle │─►│ Combiner  │─►│ Hardware  │ │
//!                  │  │ ChannelSet│  │  thread   │  │   Link    │ │
//!                  │  └───────────┘  └───────────┘  └───────────┘ │
//!                  └──────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod combiner;
pub mod console;
pub mod error;
pub mod lifecycle;
pub mod server;
pub mod transform;

pub use crate::combiner::{LoopState, LoopStats};
pub use crate::console::{Command, Reply, execute};
pub use crate::error::ServerError;
pub use crate::server::{DmServer, StartOutcome, StatusReport, StopOutcome};
pub use crate::transform::ptt_to_actuator;
