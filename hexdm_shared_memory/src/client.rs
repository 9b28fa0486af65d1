//! External writer handle
//!
//! Processes other than the server attach to one channel by index and
//! write through the same protocol. A client never owns the file.

use crate::error::{ShmError, ShmResult};
use crate::segment::ChannelSegment;
use hexdm_common::consts::{COMBINED_CHANNEL_NAME, channel_name};
use hexdm_common::dm::types::SegmentPtt;
use std::path::Path;
use std::time::Duration;

/// Attached view of one channel segment.
pub struct ChannelClient {
    segment: ChannelSegment,
}

impl ChannelClient {
    /// Attach to virtual channel `index` (`<prefix>ptt<NN>`).
    pub fn attach(dir: &Path, prefix: &str, index: usize) -> ShmResult<Self> {
        Ok(Self {
            segment: ChannelSegment::attach(dir, prefix, &channel_name(index))?,
        })
    }

    /// Attach to the combined channel (`<prefix>ptt`), e.g. for monitoring.
    pub fn attach_combined(dir: &Path, prefix: &str) -> ShmResult<Self> {
        Ok(Self {
            segment: ChannelSegment::attach(dir, prefix, COMBINED_CHANNEL_NAME)?,
        })
    }

    /// Overwrite the whole channel.
    pub fn write(&self, data: &[f64]) -> ShmResult<u64> {
        self.segment.write(data)
    }

    /// Replace one segment's triple, keeping the others.
    pub fn write_segment(&self, segment: usize, ptt: SegmentPtt) -> ShmResult<u64> {
        let (mut data, _) = self.segment.read()?;
        if !ptt.write_flat(&mut data, segment) {
            return Err(self.segment_out_of_range(segment));
        }
        self.segment.write(&data)
    }

    /// Read one segment's triple.
    pub fn segment_ptt(&self, segment: usize) -> ShmResult<SegmentPtt> {
        let (data, _) = self.segment.read()?;
        SegmentPtt::from_flat(&data, segment).ok_or_else(|| self.segment_out_of_range(segment))
    }

    fn segment_out_of_range(&self, segment: usize) -> ShmError {
        ShmError::InvalidGeometry(format!(
            "segment {segment} out of range 0..{}",
            self.segment.nseg()
        ))
    }

    /// Zero the channel.
    pub fn zero(&self) -> u64 {
        self.segment.zero()
    }

    /// Consistent snapshot and its version.
    pub fn read(&self) -> ShmResult<(Vec<f64>, u64)> {
        self.segment.read()
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.segment.version()
    }

    /// Wait for the version to pass `last_seen`.
    pub fn wait_for_change(&self, last_seen: u64, timeout: Duration) -> Option<u64> {
        self.segment.wait_for_change(last_seen, timeout)
    }

    /// Logical channel name.
    pub fn name(&self) -> &str {
        self.segment.name()
    }

    /// Number of mirror segments.
    pub fn nseg(&self) -> usize {
        self.segment.nseg()
    }
}
