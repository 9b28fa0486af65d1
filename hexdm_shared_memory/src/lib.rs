//! # HexDM Shared Memory Channels
//!
//! Memory-mapped PTT channels for the HexDM control server. Each channel is
//! a file under the segment directory (normally `/dev/shm`) holding a 64-byte
//! header and `3 * nseg` `f64` values. Clients in any process write a
//! channel; the server's combiner sums all channels into the combined
//! channel and drives the mirror from it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │  ChannelClient  │    │   ChannelSet    │    │    Combiner     │
//! │ (other process) ├───►│ ptt00 .. pttNN  ├───►│ sum + publish   │
//! └─────────────────┘    │ ptt (combined)  │    └─────────────────┘
//!                        │ doorbell        │
//!                        └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hexdm_shared_memory::{ChannelClient, ChannelSet};
//! use hexdm_common::dm::types::SegmentPtt;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let set = ChannelSet::create(Path::new("/dev/shm"), "", 4, 169)?;
//!
//! let client = ChannelClient::attach(Path::new("/dev/shm"), "", 0)?;
//! client.write_segment(12, SegmentPtt::new(50.0, 0.0, 0.0))?;
//!
//! let (combined, version) = set.read(set.combined_index())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - **ChannelSegment**: `Sync`; in-process writers are serialized, readers
//!   retry on torn reads
//! - **ChannelSet**: shared by `Arc` between the control surface and the
//!   combiner
//! - **ChannelClient**: one per external writer

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod channel_set;
pub mod client;
pub mod error;
pub mod platform;
pub mod segment;
pub mod signal;
pub mod version;

pub use channel_set::ChannelSet;
pub use client::ChannelClient;
pub use error::{ShmError, ShmResult};
pub use segment::{CHANNEL_MAGIC, ChannelHeader, ChannelSegment, HEADER_SIZE, SEGMENT_SUFFIX};
pub use signal::WakeSignal;
pub use version::{VersionTracker, is_newer};
