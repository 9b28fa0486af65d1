//! Version bookkeeping for change detection
//!
//! Every completed channel write increments the channel's version by one.
//! A reader keeps the last version it acted on per channel; a channel has
//! changed when its current version is strictly greater.

/// Per-channel cache of the last observed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTracker {
    seen: Vec<u64>,
}

impl VersionTracker {
    /// Tracker for `len` channels, all at version 0.
    pub fn new(len: usize) -> Self {
        Self { seen: vec![0; len] }
    }

    /// Tracker primed with the given current versions.
    pub fn from_versions(versions: impl IntoIterator<Item = u64>) -> Self {
        Self {
            seen: versions.into_iter().collect(),
        }
    }

    /// Record `version` for channel `index`. Returns true if it advanced.
    ///
    /// Out-of-range indices are ignored.
    pub fn observe(&mut self, index: usize, version: u64) -> bool {
        match self.seen.get_mut(index) {
            Some(seen) if is_newer(*seen, version) => {
                *seen = version;
                true
            }
            _ => false,
        }
    }

    /// Record the versions of all channels in order. Returns how many advanced.
    pub fn observe_all(&mut self, versions: impl IntoIterator<Item = u64>) -> usize {
        versions
            .into_iter()
            .enumerate()
            .filter(|(index, version)| self.observe(*index, *version))
            .count()
    }

    /// Last observed version of channel `index`.
    pub fn seen(&self, index: usize) -> Option<u64> {
        self.seen.get(index).copied()
    }

    /// Number of tracked channels.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when no channel is tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// True when `current` is a later write than `seen`.
pub fn is_newer(seen: u64, current: u64) -> bool {
    current > seen
}
