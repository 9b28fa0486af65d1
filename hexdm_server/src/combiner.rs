//! Combiner: the control loop that drives the mirror.
//!
//! A single background thread watches the virtual channels of a
//! `ChannelSet`. Whenever one of them changes it sums all channels, publishes
//! the sum into the combined channel, converts it to an actuator command and
//! pushes the command through the hardware link.
//!
//! # Wake Modes
//!
//! | Mode  | Wakes on | Combines when |
//! |-------|----------|---------------|
//! | Poll  | every `wake_interval` | a channel version advanced |
//! | Event | set doorbell, or `wake_interval` at most | doorbell rang or a version advanced |
//!
//! The running flag is checked between cycles only; a started cycle always
//! completes. Hardware errors are counted and the loop goes on. A channel
//! header that stops validating faults the loop.

use crate::transform::ptt_to_actuator_into;
use hexdm_common::consts::NDOF;
use hexdm_common::dm::config::{CombinerConfig, TransformConfig, WakeMode};
use hexdm_common::dm::types::ActuatorCommand;
use hexdm_hal::HardwareLink;
use hexdm_shared_memory::{ChannelSet, ShmError, ShmResult, VersionTracker};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Control loop state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopState {
    /// No loop thread
    #[default]
    Idle,
    /// Loop thread active
    Running,
    /// Loop died on an invariant violation
    Faulted(String),
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Running => write!(f, "running"),
            LoopState::Faulted(reason) => write!(f, "fault: {reason}"),
        }
    }
}

/// Loop counters, cumulative across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Wake-ups handled
    pub cycles: u64,
    /// Combine cycles completed
    pub combines: u64,
    /// Sends rejected by the hardware link
    pub hardware_errors: u64,
    /// Combines postponed by a torn channel read
    pub read_conflicts: u64,
    /// Duration of the last combine [us]
    pub last_combine_us: u64,
    /// Longest combine so far [us]
    pub max_combine_us: u64,
}

/// State and counters shared between the loop thread and the control surface.
#[derive(Debug, Default)]
pub struct LoopMonitor {
    state: Mutex<LoopState>,
    stats: Mutex<LoopStats>,
}

impl LoopMonitor {
    /// Idle monitor with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.state.lock().clone()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LoopStats {
        *self.stats.lock()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock() = state;
    }
}

/// Elementwise `out += channel`.
pub fn accumulate(out: &mut [f64], channel: &[f64]) {
    for (acc, value) in out.iter_mut().zip(channel) {
        *acc += value;
    }
}

/// Buffers and steps of one combine cycle.
pub struct CombineCycle {
    sum: Vec<f64>,
    channel: Vec<f64>,
    command: ActuatorCommand,
    transform: TransformConfig,
    nseg: usize,
}

impl CombineCycle {
    /// Preallocate buffers for `nseg` segments.
    pub fn new(nseg: usize, transform: TransformConfig) -> Self {
        Self {
            sum: vec![0.0; NDOF * nseg],
            channel: vec![0.0; NDOF * nseg],
            command: ActuatorCommand::zeroed(transform.command_size, NDOF * nseg),
            transform,
            nseg,
        }
    }

    /// Sum every virtual channel, publish the result and convert it.
    ///
    /// Returns the combined channel's new version.
    pub fn combine(&mut self, set: &ChannelSet) -> ShmResult<u64> {
        self.sum.fill(0.0);
        for index in 0..set.nch() {
            set.read_into(index, &mut self.channel)?;
            accumulate(&mut self.sum, &self.channel);
        }
        let version = set.publish_combined(&self.sum)?;
        ptt_to_actuator_into(&self.sum, self.nseg, &self.transform, &mut self.command);
        Ok(version)
    }

    /// Last combined PTT buffer.
    pub fn combined(&self) -> &[f64] {
        &self.sum
    }

    /// Last actuator command.
    pub fn command(&self) -> &ActuatorCommand {
        &self.command
    }
}

/// Handle to a running combiner thread.
pub struct CombinerHandle {
    running: Arc<AtomicBool>,
    set: Arc<ChannelSet>,
    monitor: Arc<LoopMonitor>,
    thread: Option<JoinHandle<()>>,
}

impl CombinerHandle {
    /// Start the loop on `set`.
    pub fn spawn(
        set: Arc<ChannelSet>,
        link: Arc<Mutex<HardwareLink>>,
        config: &CombinerConfig,
        transform: &TransformConfig,
        monitor: Arc<LoopMonitor>,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let worker = CombinerLoop {
            cycle: CombineCycle::new(set.nseg(), transform.clone()),
            tracker: VersionTracker::from_versions(set.versions()),
            versions: Vec::with_capacity(set.nch()),
            set: Arc::clone(&set),
            link,
            running: Arc::clone(&running),
            monitor: Arc::clone(&monitor),
            mode: config.wake_mode,
            interval: config.wake_interval(),
        };

        monitor.set_state(LoopState::Running);
        let thread = thread::Builder::new()
            .name("hexdm-combiner".to_string())
            .spawn(move || worker.run());

        match thread {
            Ok(thread) => Ok(Self {
                running,
                set,
                monitor,
                thread: Some(thread),
            }),
            Err(e) => {
                monitor.set_state(LoopState::Idle);
                Err(e)
            }
        }
    }

    /// True once the thread has exited on its own (fault).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Request the loop to stop and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        self.set.ring_doorbell();
        if thread.join().is_err() {
            error!("Combiner thread panicked");
        }
        self.monitor.set_state(LoopState::Idle);
    }
}

impl Drop for CombinerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct CombinerLoop {
    set: Arc<ChannelSet>,
    link: Arc<Mutex<HardwareLink>>,
    cycle: CombineCycle,
    tracker: VersionTracker,
    versions: Vec<u64>,
    running: Arc<AtomicBool>,
    monitor: Arc<LoopMonitor>,
    mode: WakeMode,
    interval: Duration,
}

impl CombinerLoop {
    fn run(mut self) {
        info!(
            mode = ?self.mode,
            interval_ms = self.interval.as_millis() as u64,
            nch = self.set.nch(),
            "DM control loop started"
        );
        if detect_rt_mode() {
            info!("Running in real-time mode");
        } else {
            debug!("Running in standard (non-RT) mode");
        }

        // Publish the current state once so the mirror matches the channels.
        let mut doorbell = self.set.doorbell_count();
        let mut fault = self.step(true).err();

        while fault.is_none() && self.running.load(Ordering::SeqCst) {
            let rang = match self.mode {
                WakeMode::Poll => {
                    thread::sleep(self.interval);
                    false
                }
                WakeMode::Event => match self.set.wait_for_update(doorbell, self.interval) {
                    Some(count) => {
                        doorbell = count;
                        true
                    }
                    None => false,
                },
            };

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            fault = self.step(rang).err();
        }

        let stats = self.monitor.stats();
        match fault {
            Some(reason) => {
                error!("DM control loop fault: {}", reason);
                self.monitor.set_state(LoopState::Faulted(reason));
            }
            None => info!(
                "DM control loop stopped after {} cycles ({} combines, {} hardware errors)",
                stats.cycles, stats.combines, stats.hardware_errors
            ),
        }
    }

    /// One wake-up. `Err` carries the fault reason and ends the loop.
    fn step(&mut self, force: bool) -> Result<(), String> {
        self.set.validate().map_err(|e| e.to_string())?;

        self.versions.clear();
        self.versions.extend(self.set.versions());
        let tracker = &self.tracker;
        let advanced = self
            .versions
            .iter()
            .enumerate()
            .any(|(index, version)| tracker.seen(index).is_some_and(|seen| *version > seen));

        self.monitor.stats.lock().cycles += 1;
        if !(advanced || force) {
            return Ok(());
        }

        let started = Instant::now();
        match self.cycle.combine(&self.set) {
            Ok(version) => debug!(version, "Combined channel updated"),
            Err(ShmError::VersionConflict { name }) => {
                warn!("Channel {} busy, combine postponed", name);
                self.monitor.stats.lock().read_conflicts += 1;
                return Ok(());
            }
            Err(e) => return Err(e.to_string()),
        }
        self.tracker.observe_all(self.versions.iter().copied());

        let sent = self.link.lock().send(self.cycle.command());
        let elapsed_us = started.elapsed().as_micros() as u64;

        let mut stats = self.monitor.stats.lock();
        stats.combines += 1;
        stats.last_combine_us = elapsed_us;
        stats.max_combine_us = stats.max_combine_us.max(elapsed_us);
        if let Err(e) = sent {
            stats.hardware_errors += 1;
            if stats.hardware_errors <= 10 || stats.hardware_errors % 1000 == 0 {
                warn!("Hardware error #{}: {}", stats.hardware_errors, e);
            }
        }
        Ok(())
    }
}

/// Detect if running in real-time mode by checking scheduler policy.
fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        // SAFETY: sched_getscheduler(0) only queries the calling thread.
        unsafe {
            let policy = sched_getscheduler(0);
            policy == SCHED_FIFO || policy == SCHED_RR
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}
