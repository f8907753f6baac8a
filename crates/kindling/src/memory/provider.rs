//! Process discovery abstraction

use crate::error::{Error, Result};
use crate::memory::{ProcessHandle, ReadMemory};

/// Identity and main-module metadata of an opened process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub base_address: u64,
    pub module_size: usize,
}

/// A process opened for reading.
pub trait AttachedProcess: ReadMemory {
    fn info(&self) -> ProcessInfo;
}

/// Finds and opens processes by executable name.
///
/// The attach state machine only talks to the OS through this trait, which
/// lets tests simulate crashes and restarts.
pub trait ProcessProvider {
    type Process: AttachedProcess;

    /// PID of the first running process named `process_name`, if any.
    fn find_pid(&self, process_name: &str) -> Result<Option<u32>>;

    /// Open `pid` and resolve `module_name` inside it.
    fn open(&self, pid: u32, module_name: &str) -> Result<Self::Process>;

    /// Terminate every process named `process_name`, returning how many were signalled.
    fn terminate_all(&self, process_name: &str) -> Result<usize> {
        Err(Error::Unsupported(format!(
            "cannot terminate {process_name}: provider does not support termination"
        )))
    }
}

/// Processes of the local machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessProvider for SystemProcesses {
    type Process = ProcessHandle;

    #[cfg(target_os = "windows")]
    fn find_pid(&self, process_name: &str) -> Result<Option<u32>> {
        let processes = super::handle::win::list_processes()?;
        Ok(processes
            .into_iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(process_name))
            .map(|(pid, _)| pid))
    }

    #[cfg(not(target_os = "windows"))]
    fn find_pid(&self, _process_name: &str) -> Result<Option<u32>> {
        Err(Error::Unsupported(
            "Process lookup is only supported on Windows".to_string(),
        ))
    }

    fn open(&self, pid: u32, module_name: &str) -> Result<ProcessHandle> {
        ProcessHandle::open(pid, module_name)
    }

    #[cfg(target_os = "windows")]
    fn terminate_all(&self, process_name: &str) -> Result<usize> {
        super::handle::win::terminate_by_name(process_name)
    }
}
