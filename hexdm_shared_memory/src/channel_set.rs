//! Channel set: `nch` virtual channels plus the combined channel
//!
//! Channels are addressed by index. Indices `0..nch` are the virtual
//! channels `ptt00..`, index `nch` is the combined channel `ptt`. Every
//! virtual-channel write, zero and signal also rings the set-wide doorbell
//! so an event-driven combiner needs a single wait.
//!
//! `destroy` removes the files immediately, even while other `Arc` holders
//! remain; those holders then get `ShmError::Destroyed` from every call.

use crate::error::{ShmError, ShmResult};
use crate::segment::ChannelSegment;
use crate::signal::WakeSignal;
use hexdm_common::consts::{COMBINED_CHANNEL_NAME, NDOF, channel_name};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Owned set of `nch + 1` channel segments sharing one geometry.
#[derive(Debug)]
pub struct ChannelSet {
    channels: Vec<ChannelSegment>,
    doorbell: WakeSignal,
    destroyed: AtomicBool,
    nch: usize,
    nseg: usize,
    dir: PathBuf,
    prefix: String,
}

impl ChannelSet {
    /// Create `nch` virtual channels and the combined channel under `dir`.
    ///
    /// On failure, segments created so far are removed again.
    pub fn create(dir: &Path, prefix: &str, nch: usize, nseg: usize) -> ShmResult<Self> {
        if nch == 0 {
            return Err(ShmError::InvalidGeometry(
                "a channel set needs at least one virtual channel".to_string(),
            ));
        }

        let mut channels = Vec::with_capacity(nch + 1);
        for index in 0..nch {
            channels.push(ChannelSegment::create(dir, prefix, &channel_name(index), nseg)?);
        }
        channels.push(ChannelSegment::create(dir, prefix, COMBINED_CHANNEL_NAME, nseg)?);

        info!(
            nch,
            nseg,
            dir = %dir.display(),
            "Allocated channel set ({} segments)",
            nch + 1
        );

        Ok(Self {
            channels,
            doorbell: WakeSignal::new(),
            destroyed: AtomicBool::new(false),
            nch,
            nseg,
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
        })
    }

    /// Number of virtual channels.
    pub fn nch(&self) -> usize {
        self.nch
    }

    /// Number of mirror segments per channel.
    pub fn nseg(&self) -> usize {
        self.nseg
    }

    /// Total number of channels including the combined one.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Shape of every channel as `(ndof, nseg)`.
    pub fn shape(&self) -> (usize, usize) {
        (NDOF, self.nseg)
    }

    /// Values per channel.
    pub fn channel_len(&self) -> usize {
        NDOF * self.nseg
    }

    /// Index of the combined channel.
    pub fn combined_index(&self) -> usize {
        self.nch
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Prefix prepended to segment names.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn ensure_live(&self) -> ShmResult<()> {
        if self.is_destroyed() {
            return Err(ShmError::Destroyed { nch: self.nch });
        }
        Ok(())
    }

    /// Any channel, combined included.
    pub fn channel(&self, index: usize) -> ShmResult<&ChannelSegment> {
        self.ensure_live()?;
        self.channels.get(index).ok_or(ShmError::InvalidChannel {
            index,
            limit: self.channels.len(),
        })
    }

    fn virtual_channel(&self, index: usize) -> ShmResult<&ChannelSegment> {
        self.ensure_live()?;
        if index >= self.nch {
            return Err(ShmError::InvalidChannel {
                index,
                limit: self.nch,
            });
        }
        Ok(&self.channels[index])
    }

    fn combined(&self) -> &ChannelSegment {
        &self.channels[self.nch]
    }

    /// Write virtual channel `index`. Returns the new version.
    pub fn write(&self, index: usize, data: &[f64]) -> ShmResult<u64> {
        let version = self.virtual_channel(index)?.write(data)?;
        self.doorbell.post();
        debug!(channel = index, version, "Channel written");
        Ok(version)
    }

    /// Zero virtual channel `index`. Returns the new version.
    pub fn zero(&self, index: usize) -> ShmResult<u64> {
        let version = self.virtual_channel(index)?.zero();
        self.doorbell.post();
        debug!(channel = index, version, "Channel zeroed");
        Ok(version)
    }

    /// Zero every virtual channel. The combined channel is left to the combiner.
    ///
    /// A no-op on a destroyed set.
    pub fn zero_all(&self) {
        if self.is_destroyed() {
            return;
        }
        for channel in &self.channels[..self.nch] {
            channel.zero();
        }
        self.doorbell.post();
        debug!(nch = self.nch, "All channels zeroed");
    }

    /// Post channel `index` without writing and ring the doorbell.
    pub fn signal(&self, index: usize) -> ShmResult<()> {
        self.virtual_channel(index)?.signal();
        self.doorbell.post();
        Ok(())
    }

    /// Write the combined channel. Does not ring the doorbell.
    pub fn publish_combined(&self, data: &[f64]) -> ShmResult<u64> {
        self.ensure_live()?;
        self.combined().write(data)
    }

    /// Consistent snapshot of any channel.
    pub fn read(&self, index: usize) -> ShmResult<(Vec<f64>, u64)> {
        self.channel(index)?.read()
    }

    /// Consistent snapshot of any channel into `out`.
    pub fn read_into(&self, index: usize, out: &mut [f64]) -> ShmResult<u64> {
        self.channel(index)?.read_into(out)
    }

    /// Version of any channel.
    pub fn version(&self, index: usize) -> ShmResult<u64> {
        Ok(self.channel(index)?.version())
    }

    /// Versions of the virtual channels in index order.
    pub fn versions(&self) -> impl Iterator<Item = u64> + '_ {
        self.channels[..self.nch].iter().map(ChannelSegment::version)
    }

    /// Block until channel `index` moves past `last_seen` or is signaled.
    pub fn wait_for_change(
        &self,
        index: usize,
        last_seen: u64,
        timeout: Duration,
    ) -> ShmResult<Option<u64>> {
        Ok(self.channel(index)?.wait_for_change(last_seen, timeout))
    }

    /// Ring the doorbell without touching any channel.
    pub fn ring_doorbell(&self) -> u64 {
        self.doorbell.post()
    }

    /// Doorbell post count.
    pub fn doorbell_count(&self) -> u64 {
        self.doorbell.count()
    }

    /// Block until the doorbell count differs from `seen` or `timeout` elapses.
    pub fn wait_for_update(&self, seen: u64, timeout: Duration) -> Option<u64> {
        self.doorbell.wait_past(seen, timeout)
    }

    /// Check every shared header.
    pub fn validate(&self) -> ShmResult<()> {
        self.ensure_live()?;
        self.channels.iter().try_for_each(ChannelSegment::validate)
    }

    /// Logical name of channel `index`.
    pub fn name(&self, index: usize) -> ShmResult<&str> {
        Ok(self.channel(index)?.name())
    }

    /// Backing file of channel `index`.
    pub fn path(&self, index: usize) -> ShmResult<&Path> {
        Ok(self.channel(index)?.path())
    }

    /// Remove every segment file, combined included, and mark the set dead.
    ///
    /// Idempotent. Waiters on the doorbell are woken.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(nch = self.nch, "Destroying channel set");
        for channel in &self.channels {
            channel.unlink();
        }
        self.doorbell.post();
    }

    /// True once `destroy` ran.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
