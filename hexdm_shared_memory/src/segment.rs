//! Channel segment layout and the versioned write protocol
//!
//! A channel segment is one file `<dir>/<prefix><name>.im.shm` holding a
//! 64-byte header followed by `NDOF * nseg` little-endian `f64` values laid
//! out as `[piston, tip, tilt]` per segment.
//!
//! ## Write protocol
//!
//! 1. raise `write`
//! 2. copy the payload
//! 3. reset `cnt1` to 0
//! 4. increment `version` (release)
//! 5. post the wake signal
//! 6. lower `write`
//!
//! A reader that loads `version`, copies the payload, and loads `version`
//! and `write` again either sees an unchanged version with the flag low
//! (consistent snapshot) or retries.

use crate::error::{ShmError, ShmResult};
use crate::platform::{
    SegmentMapConfig, attach_segment_map, create_segment_map, get_current_pid, is_process_alive,
};
use crate::signal::WakeSignal;
use hexdm_common::consts::NDOF;
use memmap2::MmapRaw;
use parking_lot::Mutex;
use static_assertions::const_assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering, fence};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Magic number identifying a channel segment (`"HEXDMPTT"`).
pub const CHANNEL_MAGIC: u64 = u64::from_le_bytes(*b"HEXDMPTT");

/// Size of the segment header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<ChannelHeader>();

/// File name suffix of every segment.
pub const SEGMENT_SUFFIX: &str = ".im.shm";

/// Reads retried before a torn read is reported as a conflict.
pub const MAX_READ_RETRIES: usize = 64;

/// How long a raised `write` flag may sit on an unchanged version before
/// the writer is presumed dead and the flag ignored.
pub const STALE_WRITE_AFTER: Duration = Duration::from_millis(10);

/// Wait slice used to catch writers in other processes, which bump the
/// version without posting our in-process signal.
pub const EXTERNAL_POLL_SLICE: Duration = Duration::from_millis(1);

/// Segment header, shared with every process that maps the file.
#[repr(C, align(64))]
pub struct ChannelHeader {
    /// Magic number for validation
    pub magic: u64,
    /// Completed write counter (`cnt0`)
    pub version: AtomicU64,
    /// Secondary counter, reset to 0 by every write
    pub cnt1: AtomicU64,
    /// Wall-clock time of the last completed write [ns since epoch]
    pub last_write_ns: AtomicU64,
    /// 1 while a write is in progress
    pub write: AtomicU32,
    /// Process that created the segment
    pub creator_pid: AtomicU32,
    /// Degrees of freedom per segment
    pub ndof: u32,
    /// Number of mirror segments
    pub nseg: u32,
    _padding: [u8; 16],
}

const_assert_eq!(std::mem::size_of::<ChannelHeader>(), 64);
const_assert_eq!(std::mem::align_of::<ChannelHeader>(), 64);

impl ChannelHeader {
    fn new(nseg: u32, creator_pid: u32) -> Self {
        Self {
            magic: CHANNEL_MAGIC,
            version: AtomicU64::new(0),
            cnt1: AtomicU64::new(0),
            last_write_ns: AtomicU64::new(0),
            write: AtomicU32::new(0),
            creator_pid: AtomicU32::new(creator_pid),
            ndof: NDOF as u32,
            nseg,
            _padding: [0; 16],
        }
    }

    /// Check magic and geometry against the expected segment count.
    pub fn validate(&self, nseg: usize) -> Result<(), String> {
        if self.magic != CHANNEL_MAGIC {
            return Err(format!("bad magic {:#018x}", self.magic));
        }
        if self.ndof as usize != NDOF || self.nseg as usize != nseg {
            return Err(format!(
                "geometry ({}, {}) expected ({}, {})",
                self.ndof, self.nseg, NDOF, nseg
            ));
        }
        Ok(())
    }

    /// Completed write count.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Secondary counter.
    pub fn cnt1(&self) -> u64 {
        self.cnt1.load(Ordering::Acquire)
    }

    /// True while a writer is between steps 1 and 6.
    pub fn is_writing(&self) -> bool {
        self.write.load(Ordering::Acquire) != 0
    }

    /// Process that created the segment.
    pub fn creator_pid(&self) -> u32 {
        self.creator_pid.load(Ordering::Acquire)
    }

    /// Time of the last completed write [ns since epoch], 0 if never written.
    pub fn last_write_ns(&self) -> u64 {
        self.last_write_ns.load(Ordering::Acquire)
    }
}

/// Path of segment `file_name` inside `dir`.
pub fn segment_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!("{file_name}{SEGMENT_SUFFIX}"))
}

/// One memory-mapped PTT channel.
///
/// The creating handle owns the file and removes it on drop or `unlink`;
/// attached handles only unmap. The mapping outlives the file.
#[derive(Debug)]
pub struct ChannelSegment {
    name: String,
    path: PathBuf,
    nseg: usize,
    map: MmapRaw,
    owner: bool,
    unlinked: AtomicBool,
    stale_version: AtomicU64,
    write_lock: Mutex<()>,
    signal: WakeSignal,
}

impl ChannelSegment {
    /// Create segment `name` for `nseg` segments under `dir`.
    ///
    /// A leftover file whose creator process is dead is reclaimed; one whose
    /// creator is alive (including this process) is `AlreadyExists`.
    pub fn create(dir: &Path, prefix: &str, name: &str, nseg: usize) -> ShmResult<Self> {
        if nseg == 0 || nseg > u32::MAX as usize {
            return Err(ShmError::InvalidGeometry(format!("nseg = {nseg}")));
        }

        let path = segment_path(dir, &format!("{prefix}{name}"));
        if path.exists() {
            reclaim_stale(&path, name)?;
        }

        let size = HEADER_SIZE + NDOF * nseg * std::mem::size_of::<f64>();
        let map = create_segment_map(&path, size, &SegmentMapConfig::default())?;

        let creator_pid = get_current_pid();
        // SAFETY: the mapping is page aligned and at least HEADER_SIZE long,
        // and nobody else can have mapped a file created with create_new.
        unsafe {
            std::ptr::write(
                map.as_mut_ptr() as *mut ChannelHeader,
                ChannelHeader::new(nseg as u32, creator_pid),
            );
        }
        fence(Ordering::Release);

        debug!("Created segment {} ({} bytes)", path.display(), size);

        Ok(Self {
            name: name.to_string(),
            path,
            nseg,
            map,
            owner: true,
            unlinked: AtomicBool::new(false),
            stale_version: AtomicU64::new(u64::MAX),
            write_lock: Mutex::new(()),
            signal: WakeSignal::new(),
        })
    }

    /// Attach to an existing segment without taking ownership of the file.
    pub fn attach(dir: &Path, prefix: &str, name: &str) -> ShmResult<Self> {
        let path = segment_path(dir, &format!("{prefix}{name}"));
        let map = attach_segment_map(&path).map_err(|e| match e {
            ShmError::NotFound { .. } => ShmError::NotFound {
                name: name.to_string(),
            },
            other => other,
        })?;

        if map.len() < HEADER_SIZE {
            return Err(ShmError::Corrupted {
                name: name.to_string(),
                reason: format!("file is {} bytes", map.len()),
            });
        }
        // SAFETY: length checked above; mappings are page aligned.
        let header = unsafe { &*(map.as_ptr() as *const ChannelHeader) };
        let nseg = header.nseg as usize;
        header
            .validate(nseg)
            .map_err(|reason| ShmError::Corrupted {
                name: name.to_string(),
                reason,
            })?;

        let needed = HEADER_SIZE + NDOF * nseg * std::mem::size_of::<f64>();
        if map.len() < needed {
            return Err(ShmError::Corrupted {
                name: name.to_string(),
                reason: format!("file is {} bytes, header needs {}", map.len(), needed),
            });
        }

        Ok(Self {
            name: name.to_string(),
            path,
            nseg,
            map,
            owner: false,
            unlinked: AtomicBool::new(false),
            stale_version: AtomicU64::new(u64::MAX),
            write_lock: Mutex::new(()),
            signal: WakeSignal::new(),
        })
    }

    /// Shared header.
    pub fn header(&self) -> &ChannelHeader {
        // SAFETY: every constructor guarantees at least HEADER_SIZE mapped,
        // page-aligned bytes holding an initialized header.
        unsafe { &*(self.map.as_ptr() as *const ChannelHeader) }
    }

    fn data_ptr(&self) -> *mut f64 {
        // SAFETY: the data section starts right after the 64-byte header.
        unsafe { self.map.as_mut_ptr().add(HEADER_SIZE) as *mut f64 }
    }

    /// Run the write protocol around `fill`, which receives the live buffer.
    fn commit(&self, fill: impl FnOnce(&mut [f64])) -> u64 {
        let _guard = self.write_lock.lock();
        let header = self.header();

        header.write.swap(1, Ordering::Acquire);
        fence(Ordering::Release);

        // SAFETY: the data section holds len() f64 values; in-process writers
        // are serialized by write_lock.
        let live = unsafe { std::slice::from_raw_parts_mut(self.data_ptr(), self.len()) };
        fill(live);

        header.cnt1.store(0, Ordering::Relaxed);
        let version = header.version.fetch_add(1, Ordering::Release) + 1;
        header.last_write_ns.store(now_ns(), Ordering::Relaxed);
        self.signal.post();
        header.write.store(0, Ordering::Release);
        version
    }

    /// Write a full channel. Returns the new version.
    pub fn write(&self, data: &[f64]) -> ShmResult<u64> {
        if data.len() != self.len() {
            return Err(ShmError::ShapeMismatch {
                expected: self.len(),
                actual: data.len(),
            });
        }
        Ok(self.commit(|live| live.copy_from_slice(data)))
    }

    /// Write all zeros. Returns the new version.
    pub fn zero(&self) -> u64 {
        self.commit(|live| live.fill(0.0))
    }

    /// Copy a consistent snapshot into `out`. Returns its version.
    ///
    /// A `write` flag left raised by a writer that died mid-write is ignored
    /// once the version has not moved for `STALE_WRITE_AFTER`. Later reads at
    /// the same version skip the wait.
    pub fn read_into(&self, out: &mut [f64]) -> ShmResult<u64> {
        if out.len() != self.len() {
            return Err(ShmError::ShapeMismatch {
                expected: self.len(),
                actual: out.len(),
            });
        }

        let header = self.header();
        let first = header.version.load(Ordering::Acquire);
        let started = Instant::now();
        let mut stalled = true;
        for _attempt in 0..MAX_READ_RETRIES {
            if let Some(version) = self.try_read(out, false) {
                return Ok(version);
            }
            stalled &= header.version.load(Ordering::Acquire) == first;
            std::thread::yield_now();
        }

        if stalled {
            let known = self.stale_version.load(Ordering::Relaxed) == first;
            let remaining = STALE_WRITE_AFTER.saturating_sub(started.elapsed());
            if !known && !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
            if header.version.load(Ordering::Acquire) == first {
                if let Some(version) = self.try_read(out, true) {
                    if !known && header.is_writing() {
                        self.stale_version.store(version, Ordering::Relaxed);
                        warn!(
                            "Segment {} has a stale write flag at version {}, reading through it",
                            self.name, version
                        );
                    }
                    return Ok(version);
                }
            }
        }

        Err(ShmError::VersionConflict {
            name: self.name.clone(),
        })
    }

    /// One seqlock attempt. `ignore_flag` skips the `write` flag checks and
    /// relies on the version alone.
    fn try_read(&self, out: &mut [f64], ignore_flag: bool) -> Option<u64> {
        let header = self.header();
        let before = header.version.load(Ordering::Acquire);
        if !ignore_flag && header.is_writing() {
            return None;
        }

        // SAFETY: data section is len() values long; a racing writer is
        // detected by the version/flag check below.
        unsafe {
            std::ptr::copy_nonoverlapping(self.data_ptr(), out.as_mut_ptr(), out.len());
        }
        fence(Ordering::Acquire);

        let busy = !ignore_flag && header.write.load(Ordering::Relaxed) != 0;
        let after = header.version.load(Ordering::Relaxed);
        (before == after && !busy).then_some(after)
    }

    /// Snapshot of the channel and its version.
    pub fn read(&self) -> ShmResult<(Vec<f64>, u64)> {
        let mut data = vec![0.0; self.len()];
        let version = self.read_into(&mut data)?;
        Ok((data, version))
    }

    /// Current version without reading data.
    pub fn version(&self) -> u64 {
        self.header().version()
    }

    /// Post the wake signal without writing.
    pub fn signal(&self) -> u64 {
        self.signal.post()
    }

    /// Block until the version exceeds `last_seen` or the signal is posted.
    ///
    /// Returns the version observed on wake, `None` on timeout.
    pub fn wait_for_change(&self, last_seen: u64, timeout: Duration) -> Option<u64> {
        let deadline = Instant::now() + timeout;
        let posts = self.signal.count();
        loop {
            let version = self.version();
            if version > last_seen {
                return Some(version);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let slice = (deadline - now).min(EXTERNAL_POLL_SLICE);
            if self.signal.wait_past(posts, slice).is_some() {
                return Some(self.version());
            }
        }
    }

    /// Check that the shared header is still intact.
    pub fn validate(&self) -> ShmResult<()> {
        self.header()
            .validate(self.nseg)
            .map_err(|reason| ShmError::Corrupted {
                name: self.name.clone(),
                reason,
            })
    }

    /// Logical name (`ptt00`, `ptt`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of mirror segments.
    pub fn nseg(&self) -> usize {
        self.nseg
    }

    /// Values per channel (`NDOF * nseg`).
    pub fn len(&self) -> usize {
        NDOF * self.nseg
    }

    /// True for a zero-sized channel (never constructed).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shape as `(ndof, nseg)`.
    pub fn shape(&self) -> (usize, usize) {
        (NDOF, self.nseg)
    }

    /// Whether this handle removes the file on drop.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Remove the backing file now. The mapping stays valid until drop.
    ///
    /// Only the owner removes anything, and only once, so a later drop never
    /// touches a file created at the same path afterwards. Returns true if
    /// this call removed the file.
    pub fn unlink(&self) -> bool {
        if !self.owner || self.unlinked.swap(true, Ordering::AcqRel) {
            return false;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Destroyed segment {}", self.path.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove segment {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// True once the owner removed the backing file.
    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }
}

impl Drop for ChannelSegment {
    fn drop(&mut self) {
        self.unlink();
    }
}

/// Remove a leftover segment file if its creator is gone.
fn reclaim_stale(path: &Path, name: &str) -> ShmResult<()> {
    let pid = match attach_segment_map(path) {
        Ok(map) if map.len() >= HEADER_SIZE => {
            // SAFETY: length checked; mappings are page aligned.
            let header = unsafe { &*(map.as_ptr() as *const ChannelHeader) };
            if header.magic == CHANNEL_MAGIC {
                header.creator_pid()
            } else {
                0
            }
        }
        _ => 0,
    };

    if is_process_alive(pid) {
        return Err(ShmError::AlreadyExists {
            name: name.to_string(),
            pid,
        });
    }

    warn!(
        "Reclaiming stale segment {} (creator pid {} is gone)",
        path.display(),
        pid
    );
    std::fs::remove_file(path)?;
    Ok(())
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
