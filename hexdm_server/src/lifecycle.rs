//! Channel set allocation and teardown.
//!
//! The lifecycle owns at most one `ChannelSet`. Reallocating always tears
//! the old set down completely (combined channel included) before the new
//! one is created. When the new allocation fails the previous geometry is
//! re-created so the server keeps a usable set whenever it can.

use crate::error::ServerError;
use hexdm_common::dm::config::ChannelConfig;
use hexdm_shared_memory::ChannelSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Owner of the server's channel set.
pub struct Lifecycle {
    set: Option<Arc<ChannelSet>>,
    nch: usize,
    nch_prev: usize,
    nseg: usize,
    shm_dir: PathBuf,
    prefix: String,
}

impl Lifecycle {
    /// Unallocated lifecycle. `nch` starts at `channels.default_nch`.
    pub fn new(channels: &ChannelConfig, nseg: usize) -> Self {
        Self {
            set: None,
            nch: channels.default_nch,
            nch_prev: channels.default_nch,
            nseg,
            shm_dir: channels.shm_dir.clone(),
            prefix: channels.prefix.clone(),
        }
    }

    /// Replace the current set with `new_nch` virtual channels.
    ///
    /// On failure the previous set (if any) is re-created empty and
    /// `AllocationFailure` is returned either way.
    pub fn allocate(&mut self, new_nch: usize) -> Result<Arc<ChannelSet>, ServerError> {
        let previous = self.set.as_ref().map(|set| set.nch());
        if self.teardown() {
            info!(nch_prev = self.nch, "Previous channel set destroyed");
        }

        match ChannelSet::create(&self.shm_dir, &self.prefix, new_nch, self.nseg) {
            Ok(set) => {
                let set = Arc::new(set);
                self.nch_prev = self.nch;
                self.nch = new_nch;
                self.set = Some(Arc::clone(&set));
                Ok(set)
            }
            Err(source) => {
                error!(requested = new_nch, "Channel allocation failed: {}", source);
                let restored = previous.is_some_and(|nch| self.restore(nch));
                Err(ServerError::AllocationFailure {
                    requested: new_nch,
                    restored,
                    source,
                })
            }
        }
    }

    fn restore(&mut self, nch: usize) -> bool {
        match ChannelSet::create(&self.shm_dir, &self.prefix, nch, self.nseg) {
            Ok(set) => {
                warn!(nch, "Previous channel geometry restored (contents reset to zero)");
                self.set = Some(Arc::new(set));
                true
            }
            Err(e) => {
                error!(nch, "Failed to restore previous channel set: {}", e);
                false
            }
        }
    }

    /// Destroy the current set. Returns false if nothing was allocated.
    ///
    /// Files are removed even when `Arc` clones of the set are still held.
    pub fn teardown(&mut self) -> bool {
        let Some(set) = self.set.take() else {
            return false;
        };
        set.destroy();
        let holders = Arc::strong_count(&set) - 1;
        if holders > 0 {
            debug!(holders, "Destroyed channel set still has outside handles");
        }
        true
    }

    /// Current set, if allocated.
    pub fn set(&self) -> Option<&Arc<ChannelSet>> {
        self.set.as_ref()
    }

    /// True when a set exists.
    pub fn is_allocated(&self) -> bool {
        self.set.is_some()
    }

    /// Current channel count.
    pub fn nch(&self) -> usize {
        self.nch
    }

    /// Channel count before the last successful allocation.
    pub fn nch_prev(&self) -> usize {
        self.nch_prev
    }

    /// Segments per channel.
    pub fn nseg(&self) -> usize {
        self.nseg
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexdm_shared_memory::ChannelSegment;
    use tempfile::TempDir;

    fn channels(dir: &TempDir) -> ChannelConfig {
        ChannelConfig {
            shm_dir: dir.path().to_path_buf(),
            ..ChannelConfig::default()
        }
    }

    #[test]
    fn test_allocate_and_resize() {
        let dir = TempDir::new().unwrap();
        let mut lifecycle = Lifecycle::new(&channels(&dir), 169);
        assert!(!lifecycle.is_allocated());
        assert_eq!(lifecycle.nch(), 4);

        let set = lifecycle.allocate(4).unwrap();
        assert_eq!(set.len(), 5);
        drop(set);

        lifecycle.allocate(2).unwrap();
        assert_eq!(lifecycle.nch(), 2);
        assert_eq!(lifecycle.nch_prev(), 4);
        assert!(dir.path().join("ptt01.im.shm").exists());
        assert!(!dir.path().join("ptt02.im.shm").exists());
        assert!(!dir.path().join("ptt03.im.shm").exists());
        assert!(dir.path().join("ptt.im.shm").exists());
    }

    #[test]
    fn test_failed_allocation_restores_previous() {
        let dir = TempDir::new().unwrap();
        let mut lifecycle = Lifecycle::new(&channels(&dir), 3);
        lifecycle.allocate(2).unwrap();

        // A live foreign segment blocks the larger set.
        let _blocker = ChannelSegment::create(dir.path(), "", "ptt05", 3).unwrap();
        let err = lifecycle.allocate(8).unwrap_err();
        assert!(matches!(
            err,
            ServerError::AllocationFailure {
                requested: 8,
                restored: true,
                ..
            }
        ));

        assert!(lifecycle.is_allocated());
        assert_eq!(lifecycle.nch(), 2);
        assert_eq!(lifecycle.set().unwrap().nch(), 2);
    }

    #[test]
    fn test_first_allocation_failure_leaves_unallocated() {
        let dir = TempDir::new().unwrap();
        let mut lifecycle = Lifecycle::new(&channels(&dir), 3);
        let _blocker = ChannelSegment::create(dir.path(), "", "ptt00", 3).unwrap();

        assert!(matches!(
            lifecycle.allocate(1),
            Err(ServerError::AllocationFailure { restored: false, .. })
        ));
        assert!(!lifecycle.is_allocated());
    }

    #[test]
    fn test_resize_with_outstanding_handle() {
        let dir = TempDir::new().unwrap();
        let mut lifecycle = Lifecycle::new(&channels(&dir), 3);
        let held = lifecycle.allocate(4).unwrap();

        let set = lifecycle.allocate(2).unwrap();
        assert_eq!(lifecycle.nch(), 2);
        assert!(held.is_destroyed());
        assert!(!dir.path().join("ptt03.im.shm").exists());

        drop(held);
        assert!(dir.path().join("ptt00.im.shm").exists());
        assert!(dir.path().join("ptt.im.shm").exists());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_teardown_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut lifecycle = Lifecycle::new(&channels(&dir), 3);
        lifecycle.allocate(1).unwrap();

        assert!(lifecycle.teardown());
        assert!(!lifecycle.teardown());
        assert!(!dir.path().join("ptt00.im.shm").exists());
        assert!(!dir.path().join("ptt.im.shm").exists());
    }
}
