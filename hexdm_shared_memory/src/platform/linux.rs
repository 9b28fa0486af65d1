//! Linux-specific segment file operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapOptions, MmapRaw};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Mapping options for channel segment files
#[derive(Debug, Clone, Copy)]
pub struct SegmentMapConfig {
    /// Pre-fault every page at map time so the control loop never takes a page fault
    pub populate: bool,
    /// File mode of newly created segment files
    pub mode: u32,
}

impl Default for SegmentMapConfig {
    fn default() -> Self {
        Self {
            populate: true,
            // Clients run under other accounts in the lab; group/other may write.
            mode: 0o666,
        }
    }
}

/// Create a new segment file of `size` bytes and map it shared.
///
/// Fails with `AlreadyExists` semantics of `create_new` if the file exists.
pub fn create_segment_map(path: &Path, size: usize, config: &SegmentMapConfig) -> ShmResult<MmapRaw> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(config.mode)
        .open(path)?;

    file.set_len(size as u64)?;

    let mut options = MmapOptions::new();
    if config.populate {
        options.populate();
    }
    let map = options.map_raw(&file)?;
    Ok(map)
}

/// Map an existing segment file.
pub fn attach_segment_map(path: &Path) -> ShmResult<MmapRaw> {
    let file = OpenOptions::new().read(true).write(true).open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ShmError::NotFound {
                name: path.display().to_string(),
            }
        } else {
            ShmError::Io { source: e }
        }
    })?;

    let map = MmapOptions::new().map_raw(&file)?;
    Ok(map)
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return false;
    }
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false,
        Err(nix::Error::EPERM) => true, // exists, owned by someone else
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}
