//! Process session ownership and the attach state machine
//!
//! ```text
//! Unattached -> Attaching -> Attached <-> Stale
//!                               |
//!                               v
//!                           Detached
//! ```
//!
//! The [`Attacher`] is the only owner of a [`ProcessSession`]. A session is
//! never repaired in place: when the process restarts (PID change) or a probe
//! read fails, the session is dropped and a fresh one is opened.

mod relaunch;

use std::thread;
use std::time::{Duration, Instant};

use strum::Display;
use tracing::{debug, info, warn};

use crate::config::attach;
use crate::error::{Error, Result};
use crate::memory::{AttachedProcess, ProcessInfo, ProcessProvider, ReadMemory};

pub use relaunch::{RelaunchCooldown, Relauncher};

/// An opened process plus its resolved main module.
#[derive(Debug)]
pub struct ProcessSession<H> {
    process: H,
    info: ProcessInfo,
}

impl<H: AttachedProcess> ProcessSession<H> {
    /// Open `pid` through `provider` and confirm the handle with one probe read.
    pub fn open<P>(provider: &P, pid: u32, module_name: &str) -> Result<Self>
    where
        P: ProcessProvider<Process = H>,
    {
        let process = provider.open(pid, module_name)?;
        let info = process.info();
        let session = Self { process, info };
        session.probe()?;
        Ok(session)
    }

    pub fn pid(&self) -> u32 {
        self.info.pid
    }

    pub fn info(&self) -> ProcessInfo {
        self.info
    }

    pub fn process(&self) -> &H {
        &self.process
    }

    /// Read a few bytes at the module base to confirm the handle still works.
    pub fn probe(&self) -> Result<()> {
        self.process
            .read_bytes(self.info.base_address, attach::PROBE_LEN)
            .map(|_| ())
            .map_err(|e| {
                debug!("Probe of PID {} failed: {}", self.info.pid, e);
                Error::StaleHandle { pid: self.info.pid }
            })
    }
}

impl<H: AttachedProcess> ReadMemory for ProcessSession<H> {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.process.read_bytes(address, size)
    }

    fn base_address(&self) -> u64 {
        self.info.base_address
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttachState {
    Unattached,
    Attaching,
    Attached,
    Stale,
    Detached,
}

/// Timing and identity settings for [`Attacher`].
#[derive(Debug, Clone)]
pub struct AttachConfig {
    pub process_name: String,
    pub module_name: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Poll this long without finding the process before relaunching
    pub relaunch_after: Duration,
    pub relaunch_timeout: Duration,
    pub relaunch_cooldown: Duration,
    pub allow_relaunch: bool,
}

impl AttachConfig {
    pub fn new(process_name: &str, module_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
            module_name: module_name.to_string(),
            timeout: attach::DEFAULT_TIMEOUT,
            poll_interval: attach::POLL_INTERVAL,
            relaunch_after: attach::RELAUNCH_AFTER,
            relaunch_timeout: attach::RELAUNCH_TIMEOUT,
            relaunch_cooldown: attach::RELAUNCH_COOLDOWN,
            allow_relaunch: false,
        }
    }
}

/// Owns the process session and keeps it pointed at the live process.
pub struct Attacher<P: ProcessProvider> {
    provider: P,
    config: AttachConfig,
    state: AttachState,
    session: Option<ProcessSession<P::Process>>,
    relauncher: Option<Box<dyn Relauncher>>,
    cooldown: RelaunchCooldown,
}

impl<P: ProcessProvider> Attacher<P> {
    pub fn new(provider: P, config: AttachConfig) -> Self {
        let cooldown = RelaunchCooldown::new(config.relaunch_cooldown);
        Self {
            provider,
            config,
            state: AttachState::Unattached,
            session: None,
            relauncher: None,
            cooldown,
        }
    }

    pub fn with_relauncher<R: Relauncher + 'static>(mut self, relauncher: R) -> Self {
        self.relauncher = Some(Box::new(relauncher));
        self
    }

    pub fn set_relauncher(&mut self, relauncher: Box<dyn Relauncher>) {
        self.relauncher = Some(relauncher);
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    pub fn config(&self) -> &AttachConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn session(&self) -> Option<&ProcessSession<P::Process>> {
        self.session.as_ref()
    }

    /// Poll for the process until it can be opened or `timeout` passes.
    ///
    /// Any existing session is dropped first. With `allow_relaunch`, once the
    /// process has been missing for `relaunch_after`, the relauncher is invoked
    /// at most once during this call, and only if the cooldown allows it.
    pub fn attach(&mut self, timeout: Duration, allow_relaunch: bool) -> Result<()> {
        self.session = None;
        self.state = AttachState::Attaching;
        let name = self.config.process_name.clone();
        let start = Instant::now();
        let mut relaunched = false;

        info!("Waiting for {}...", name);
        loop {
            match self.provider.find_pid(&name) {
                Ok(Some(pid)) => {
                    match ProcessSession::open(&self.provider, pid, &self.config.module_name) {
                        Ok(session) => {
                            let info = session.info();
                            info!(
                                "Attached to {} (PID {}, base 0x{:X}, size {:#x})",
                                name, pid, info.base_address, info.module_size
                            );
                            self.session = Some(session);
                            self.state = AttachState::Attached;
                            return Ok(());
                        }
                        Err(e) if e.is_fatal() => {
                            self.state = AttachState::Unattached;
                            return Err(e);
                        }
                        Err(e) => debug!("Found PID {} but could not attach yet: {}", pid, e),
                    }
                }
                Ok(None) => {
                    if allow_relaunch
                        && !relaunched
                        && start.elapsed() >= self.config.relaunch_after
                    {
                        let remaining = timeout.saturating_sub(start.elapsed());
                        relaunched = self.try_relaunch(remaining);
                    }
                }
                Err(e) => {
                    self.state = AttachState::Unattached;
                    return Err(e);
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                self.state = AttachState::Unattached;
                return Err(Error::AttachTimeout {
                    process: name,
                    waited: elapsed,
                });
            }
            thread::sleep(self.config.poll_interval.min(timeout - elapsed));
        }
    }

    /// Returns whether this call counts as the one relaunch for the current
    /// attach call.
    fn try_relaunch(&mut self, remaining: Duration) -> bool {
        let Some(relauncher) = self.relauncher.as_mut() else {
            debug!("Relaunch requested but no relauncher is configured");
            return true;
        };
        if !self.cooldown.is_ready() {
            debug!(
                "Relaunch suppressed, cooldown has {:?} left",
                self.cooldown.remaining()
            );
            return false;
        }

        self.cooldown.mark();
        let timeout = self.config.relaunch_timeout.min(remaining);
        info!(
            "{} not running, relaunching (timeout {:?})",
            self.config.process_name, timeout
        );
        if relauncher.relaunch(timeout) {
            info!("Relaunch reported success");
        } else {
            warn!("Relaunch did not bring {} up", self.config.process_name);
        }
        true
    }

    /// Make sure the session points at the live process, reattaching if needed.
    ///
    /// Returns `true` when a (re)attach happened. A healthy session costs one
    /// PID lookup and one probe read.
    pub fn ensure_attached(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_ref() else {
            self.attach(self.config.timeout, self.config.allow_relaunch)?;
            return Ok(true);
        };

        let stale = match self.provider.find_pid(&self.config.process_name)? {
            Some(pid) if pid == session.pid() => match session.probe() {
                Ok(()) => false,
                Err(e) => {
                    warn!("{}, reattaching", e);
                    true
                }
            },
            Some(pid) => {
                info!("PID changed {} -> {}, reattaching", session.pid(), pid);
                true
            }
            None => {
                info!("PID {} is gone, reattaching", session.pid());
                true
            }
        };

        if !stale {
            return Ok(false);
        }
        self.state = AttachState::Stale;
        self.session = None;
        self.attach(self.config.timeout, self.config.allow_relaunch)?;
        Ok(true)
    }

    /// Release the handle.
    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Detached from PID {}", session.pid());
        }
        self.state = AttachState::Detached;
    }
}
