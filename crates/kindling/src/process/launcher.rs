//! Game relaunch through an external launch command.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::relaunch;
use crate::error::Error;
use crate::memory::{ProcessProvider, SystemProcesses};
use crate::session::Relauncher;

/// Relaunches the game by running a command, then waits for the process.
///
/// Before launching, every process listed in `terminate` is killed so a hung
/// instance or crash reporter cannot block the new one.
#[derive(Debug, Clone)]
pub struct CommandRelauncher<P = SystemProcesses> {
    provider: P,
    process_name: String,
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    terminate: Vec<String>,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl CommandRelauncher<SystemProcesses> {
    pub fn new<S: Into<PathBuf>>(process_name: &str, program: S) -> Self {
        Self::with_provider(SystemProcesses, process_name, program)
    }
}

impl<P: ProcessProvider> CommandRelauncher<P> {
    pub fn with_provider<S: Into<PathBuf>>(provider: P, process_name: &str, program: S) -> Self {
        Self {
            provider,
            process_name: process_name.to_string(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            terminate: vec![process_name.to_string()],
            poll_interval: relaunch::POLL_INTERVAL,
            settle_delay: relaunch::SETTLE_DELAY,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Directory to launch in. Defaults to the program's own directory.
    pub fn working_dir<S: Into<PathBuf>>(mut self, dir: S) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Processes to kill before launching. Defaults to the target process.
    pub fn terminate<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminate = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn launch_dir(&self) -> Option<&Path> {
        self.working_dir
            .as_deref()
            .or_else(|| self.program.parent().filter(|p| !p.as_os_str().is_empty()))
    }

    fn terminate_leftovers(&self) {
        for name in &self.terminate {
            match self.provider.terminate_all(name) {
                Ok(0) => {}
                Ok(count) => info!("Terminated {} instance(s) of {}", count, name),
                Err(Error::Unsupported(reason)) => debug!("Skipping termination: {}", reason),
                Err(e) => warn!("Failed to terminate {}: {}", name, e),
            }
        }
    }

    /// Spawn the launch command and return the child process ID.
    pub fn launch(&self) -> anyhow::Result<u32> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = self.launch_dir() {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to launch {}: {e}", self.program.display()))?;
        Ok(child.id())
    }
}

impl<P: ProcessProvider> Relauncher for CommandRelauncher<P> {
    fn relaunch(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.terminate_leftovers();

        match self.launch() {
            Ok(pid) => info!("Launched {} (PID {})", self.program.display(), pid),
            Err(e) => {
                warn!("{:#}", e);
                return false;
            }
        }

        loop {
            match self.provider.find_pid(&self.process_name) {
                Ok(Some(pid)) => {
                    info!("{} is up (PID {})", self.process_name, pid);
                    let settle = self
                        .settle_delay
                        .min(deadline.saturating_duration_since(Instant::now()));
                    if !settle.is_zero() {
                        debug!("Letting {} settle for {:?}", self.process_name, settle);
                        thread::sleep(settle);
                    }
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Process lookup failed during relaunch: {}", e);
                    return false;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "{} did not appear within {:?} of relaunching",
                    self.process_name, timeout
                );
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, MockProcessProvider};

    const NAME: &str = "DarkSoulsIII.exe";

    fn provider() -> MockProcessProvider {
        MockProcessProvider::new(NAME, MockMemoryBuilder::new().build(), 0)
    }

    /// The test binary itself, which exits right away with `--list`.
    fn harmless_program() -> PathBuf {
        std::env::current_exe().unwrap()
    }

    #[test]
    fn test_launch_spawns_child() {
        let relauncher = CommandRelauncher::with_provider(provider(), NAME, harmless_program())
            .args(["--list"]);
        let pid = relauncher.launch().unwrap();
        assert!(pid > 0);
    }

    #[test]
    fn test_launch_missing_program_fails() {
        let relauncher =
            CommandRelauncher::with_provider(provider(), NAME, "/nonexistent/launcher.exe");
        let err = relauncher.launch().unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[test]
    fn test_launch_dir_defaults_to_program_parent() {
        let relauncher =
            CommandRelauncher::with_provider(provider(), NAME, "/games/ds3/launch.bat");
        assert_eq!(relauncher.launch_dir(), Some(Path::new("/games/ds3")));

        let relauncher = relauncher.working_dir("/tmp");
        assert_eq!(relauncher.launch_dir(), Some(Path::new("/tmp")));

        let bare = CommandRelauncher::with_provider(provider(), NAME, "launch.bat");
        assert_eq!(bare.launch_dir(), None);
    }

    #[test]
    fn test_relaunch_terminates_then_times_out() {
        let provider = provider();
        provider.start(100);
        let mut relauncher =
            CommandRelauncher::with_provider(provider.clone(), NAME, harmless_program())
                .args(["--list"])
                .poll_interval(Duration::from_millis(5))
                .settle_delay(Duration::ZERO);

        // The spawned program never becomes the target process
        assert!(!relauncher.relaunch(Duration::from_millis(30)));
        assert_eq!(provider.termination_count(), 1);
    }

    #[test]
    fn test_relaunch_with_failed_launch_returns_false() {
        let provider = provider();
        let mut relauncher =
            CommandRelauncher::with_provider(provider.clone(), NAME, "/nonexistent/launcher.exe");
        assert!(!relauncher.relaunch(Duration::from_millis(30)));
        assert_eq!(provider.lookup_count(), 0);
    }
}
