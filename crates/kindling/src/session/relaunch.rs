use std::time::{Duration, Instant};

/// Brings the target process back when it cannot be found.
pub trait Relauncher {
    /// Try to get the process running again within `timeout`.
    /// Returns `true` if the process is believed to be up.
    fn relaunch(&mut self, timeout: Duration) -> bool;
}

impl<F: FnMut(Duration) -> bool> Relauncher for F {
    fn relaunch(&mut self, timeout: Duration) -> bool {
        self(timeout)
    }
}

/// Minimum interval between two relaunches.
#[derive(Debug, Clone)]
pub struct RelaunchCooldown {
    interval: Duration,
    last: Option<Instant>,
}

impl RelaunchCooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time left before the next relaunch is allowed.
    pub fn remaining(&self) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}
