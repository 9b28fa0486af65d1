//! `DmServer`: the control surface.
//!
//! Owns the configuration, the channel lifecycle, the hardware link and the
//! combiner handle. Every console command maps onto one method here.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `start()` | spawn the combiner (requires an allocated set) |
//! | `stop()` | stop and join the combiner |
//! | `status()` | `"idle"`, `"running"` or `"fault: <reason>"` |
//! | `get_nch()` / `set_nch(n)` | channel count; `set_nch` reallocates |
//! | `reset(k)` | zero channel `k`, or all channels for `k < 0` |
//! | `quit()` | stop, release the mirror, destroy the set |

use crate::combiner::{CombinerHandle, LoopMonitor, LoopState, LoopStats};
use crate::error::ServerError;
use crate::lifecycle::Lifecycle;
use hexdm_common::dm::config::{HexDmConfig, WakeMode};
use hexdm_common::dm::driver::DriverDiagnostics;
use hexdm_hal::{DriverRegistry, HardwareLink, LinkStats};
use hexdm_shared_memory::ChannelSet;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Loop spawned
    Started,
    /// Loop was already running
    AlreadyRunning,
}

/// Outcome of `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Loop stopped and joined
    Stopped,
    /// No loop was running
    AlreadyIdle,
}

/// Structured server snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Loop state as reported by `status()`
    pub state: String,
    /// Current channel count
    pub nch: usize,
    /// Whether a channel set exists
    pub allocated: bool,
    /// Segments per channel
    pub nseg: usize,
    /// Hardware calls skipped
    pub simulate: bool,
    /// Connected driver, `"none"` in simulation
    pub driver: &'static str,
    /// Mirror serial number
    pub serial: String,
    /// Combiner wake mode
    pub wake_mode: WakeMode,
    /// Combiner counters
    pub loop_stats: LoopStats,
    /// Hardware link counters
    pub link_stats: LinkStats,
    /// Counters reported by the driver, if connected
    pub driver_diagnostics: Option<DriverDiagnostics>,
}

impl StatusReport {
    /// Pretty JSON rendering.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// The HexDM control server.
pub struct DmServer {
    config: HexDmConfig,
    lifecycle: Lifecycle,
    link: Arc<Mutex<HardwareLink>>,
    monitor: Arc<LoopMonitor>,
    combiner: Option<CombinerHandle>,
    closed: bool,
}

impl DmServer {
    /// Validate `config`, open the hardware link and allocate the default set.
    ///
    /// In simulation mode no driver is created.
    pub fn new(config: HexDmConfig, registry: &DriverRegistry) -> Result<Self, ServerError> {
        config.validate()?;
        let link = if config.dm.simulate {
            HardwareLink::simulated(&config.dm.serial)
        } else {
            HardwareLink::open(registry, &config.dm.driver, &config.dm.serial)?
        };
        Self::with_link(config, link)
    }

    /// Build a server around an already opened link.
    pub fn with_link(config: HexDmConfig, link: HardwareLink) -> Result<Self, ServerError> {
        config.validate()?;
        let mut lifecycle = Lifecycle::new(&config.channels, config.dm.nseg);
        if config.channels.allocate_on_startup {
            lifecycle.allocate(config.channels.default_nch)?;
        }

        info!(
            nch = lifecycle.nch(),
            nseg = config.dm.nseg,
            simulate = link.is_simulated(),
            "HexDM server ready"
        );

        Ok(Self {
            config,
            lifecycle,
            link: Arc::new(Mutex::new(link)),
            monitor: Arc::new(LoopMonitor::new()),
            combiner: None,
            closed: false,
        })
    }

    /// Start the combiner.
    ///
    /// # Errors
    /// `NotAllocated` when no channel set exists.
    pub fn start(&mut self) -> Result<StartOutcome, ServerError> {
        if let Some(handle) = &self.combiner {
            if !handle.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
            // Reap a loop that died on a fault before restarting.
            self.combiner = None;
        }

        let Some(set) = self.lifecycle.set() else {
            warn!("Start refused: set the desired number of channels first");
            return Err(ServerError::NotAllocated);
        };

        let handle = CombinerHandle::spawn(
            Arc::clone(set),
            Arc::clone(&self.link),
            &self.config.combiner,
            &self.config.transform,
            Arc::clone(&self.monitor),
        )?;
        self.combiner = Some(handle);
        info!("DM control loop START");
        Ok(StartOutcome::Started)
    }

    /// Stop the combiner and wait for it.
    pub fn stop(&mut self) -> StopOutcome {
        match self.combiner.take() {
            Some(handle) => {
                handle.stop();
                info!("DM control loop STOP");
                StopOutcome::Stopped
            }
            None => StopOutcome::AlreadyIdle,
        }
    }

    /// `"idle"`, `"running"` or `"fault: <reason>"`.
    pub fn status(&self) -> String {
        self.monitor.state().to_string()
    }

    /// Current loop state.
    pub fn state(&self) -> LoopState {
        self.monitor.state()
    }

    /// Current channel count.
    pub fn get_nch(&self) -> usize {
        self.lifecycle.nch()
    }

    /// Reallocate the set with `n` channels.
    ///
    /// A running loop is stopped, the set swapped, and the loop restarted on
    /// whatever set exists afterwards.
    pub fn set_nch(&mut self, n: i64) -> Result<(), ServerError> {
        let max = self.config.channels.max_nch;
        if n <= 0 || n as u64 > max as u64 {
            return Err(ServerError::InvalidChannelCount { requested: n, max });
        }

        info!(requested = n, nch = self.lifecycle.nch(), "Updating number of channels");
        let was_running = self.monitor.state() == LoopState::Running;
        self.stop();

        let allocated = self.lifecycle.allocate(n as usize).map(|_| ());

        if was_running && self.lifecycle.is_allocated() {
            if let Err(e) = self.start() {
                error!("Failed to restart control loop after resize: {}", e);
            }
        }
        allocated
    }

    /// Zero channel `k`, or every channel when `k < 0`.
    pub fn reset(&mut self, k: i64) -> Result<(), ServerError> {
        let set = self.lifecycle.set().ok_or(ServerError::NotAllocated)?;
        if k < 0 {
            set.zero_all();
            info!("All channels reset");
            return Ok(());
        }

        let nch = set.nch();
        if k as u64 >= nch as u64 {
            warn!(channel = k, nch, "Reset refused, channel out of range");
            return Err(ServerError::InvalidChannel { index: k, nch });
        }
        let version = set.zero(k as usize)?;
        info!(channel = k, version, "Channel reset");
        Ok(())
    }

    /// Stop the loop, release the mirror and destroy the set. Idempotent.
    pub fn quit(&mut self) -> Result<(), ServerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.stop();
        let released = self.link.lock().shutdown();
        if let Err(e) = &released {
            error!("Failed to release mirror: {}", e);
        }
        self.lifecycle.teardown();
        info!("HexDM control program quit");
        released.map_err(ServerError::from)
    }

    /// Structured snapshot for monitoring.
    pub fn status_report(&self) -> StatusReport {
        let link = self.link.lock();
        StatusReport {
            state: self.status(),
            nch: self.lifecycle.nch(),
            allocated: self.lifecycle.is_allocated(),
            nseg: self.lifecycle.nseg(),
            simulate: link.is_simulated(),
            driver: link.driver_name(),
            serial: link.serial().to_string(),
            wake_mode: self.config.combiner.wake_mode,
            loop_stats: self.monitor.stats(),
            link_stats: link.stats(),
            driver_diagnostics: link.diagnostics(),
        }
    }

    /// Current channel set, if allocated.
    pub fn channel_set(&self) -> Option<Arc<ChannelSet>> {
        self.lifecycle.set().cloned()
    }

    /// True once `quit` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Active configuration.
    pub fn config(&self) -> &HexDmConfig {
        &self.config
    }
}

impl Drop for DmServer {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!("Error during server shutdown: {}", e);
        }
    }
}
