//! Owned handle to a foreign process

use crate::error::{Error, Result};
use crate::memory::{AttachedProcess, ProcessInfo, ReadMemory};

/// An open, read-only handle to a running process with its main module resolved.
///
/// The OS handle is released when the value is dropped.
#[derive(Debug)]
pub struct ProcessHandle {
    #[cfg(target_os = "windows")]
    handle: windows::Win32::Foundation::HANDLE,
    pub pid: u32,
    pub base_address: u64,
    pub module_size: usize,
}

#[cfg(target_os = "windows")]
impl ProcessHandle {
    /// Open `pid` for reading and locate `module_name` inside it.
    pub fn open(pid: u32, module_name: &str) -> Result<Self> {
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_READ,
        };

        let (base_address, module_size) = win::find_module(pid, module_name)?;

        // SAFETY: OpenProcess has no pointer arguments; the returned handle is
        // owned by the new ProcessHandle and closed in Drop.
        let handle = unsafe {
            OpenProcess(
                PROCESS_VM_READ | PROCESS_QUERY_LIMITED_INFORMATION,
                false,
                pid,
            )
        }
        .map_err(|e| Error::ProcessOpenFailed(format!("PID {pid}: {e}")))?;

        Ok(Self {
            handle,
            pid,
            base_address,
            module_size,
        })
    }

    /// Whether the process behind the handle is still running.
    pub fn is_alive(&self) -> bool {
        use windows::Win32::Foundation::STILL_ACTIVE;
        use windows::Win32::System::Threading::GetExitCodeProcess;

        let mut code = 0u32;
        // SAFETY: `code` is a valid out pointer for the duration of the call.
        match unsafe { GetExitCodeProcess(self.handle, &mut code) } {
            Ok(()) => code == STILL_ACTIVE.0 as u32,
            Err(_) => false,
        }
    }
}

#[cfg(not(target_os = "windows"))]
impl ProcessHandle {
    pub fn open(_pid: u32, _module_name: &str) -> Result<Self> {
        Err(Error::Unsupported(
            "Process memory access is only supported on Windows".to_string(),
        ))
    }

    pub fn is_alive(&self) -> bool {
        false
    }
}

impl ReadMemory for ProcessHandle {
    #[cfg(target_os = "windows")]
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

        let mut buffer = vec![0u8; size];
        let mut read = 0usize;
        // SAFETY: `buffer` is writable for `size` bytes and outlives the call;
        // the foreign address is only dereferenced by the kernel.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                buffer.as_mut_ptr().cast(),
                size,
                Some(&mut read),
            )
        }
        .map_err(|e| Error::MemoryReadFailed {
            address,
            message: e.to_string(),
        })?;

        if read != size {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("partial read: {read} of {size} bytes"),
            });
        }
        Ok(buffer)
    }

    #[cfg(not(target_os = "windows"))]
    fn read_bytes(&self, address: u64, _size: usize) -> Result<Vec<u8>> {
        Err(Error::MemoryReadFailed {
            address,
            message: "process memory access is only supported on Windows".to_string(),
        })
    }

    fn base_address(&self) -> u64 {
        self.base_address
    }
}

impl AttachedProcess for ProcessHandle {
    fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            base_address: self.base_address,
            module_size: self.module_size,
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessHandle {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;

        // SAFETY: the handle was returned by OpenProcess and is closed exactly once.
        if let Err(e) = unsafe { CloseHandle(self.handle) } {
            tracing::debug!("Failed to close handle for PID {}: {}", self.pid, e);
        }
    }
}

#[cfg(target_os = "windows")]
pub(crate) mod win {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};

    use crate::error::{Error, Result};

    fn wide_to_string(buffer: &[u16]) -> String {
        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        String::from_utf16_lossy(&buffer[..len])
    }

    /// Closes a toolhelp snapshot when it goes out of scope.
    struct Snapshot(HANDLE);

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the snapshot handle is owned and closed exactly once.
            let _ = unsafe { CloseHandle(self.0) };
        }
    }

    /// All running processes as `(pid, executable name)`.
    pub fn list_processes() -> Result<Vec<(u32, String)>> {
        // SAFETY: no pointer arguments; the snapshot is closed by `Snapshot`.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map(Snapshot)
            .map_err(|e| Error::ProcessOpenFailed(format!("process snapshot: {e}")))?;

        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut processes = Vec::new();

        // SAFETY: `entry` is a properly sized PROCESSENTRY32W.
        let mut next = unsafe { Process32FirstW(snapshot.0, &mut entry) };
        while next.is_ok() {
            processes.push((entry.th32ProcessID, wide_to_string(&entry.szExeFile)));
            // SAFETY: as above.
            next = unsafe { Process32NextW(snapshot.0, &mut entry) };
        }

        Ok(processes)
    }

    /// Base address and size of `module_name` inside `pid`.
    pub fn find_module(pid: u32, module_name: &str) -> Result<(u64, usize)> {
        // SAFETY: no pointer arguments; the snapshot is closed by `Snapshot`.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                .map(Snapshot)
                .map_err(|_| Error::ProcessNotFound(format!("PID {pid}")))?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: `entry` is a properly sized MODULEENTRY32W.
        let mut next = unsafe { Module32FirstW(snapshot.0, &mut entry) };
        while next.is_ok() {
            if wide_to_string(&entry.szModule).eq_ignore_ascii_case(module_name) {
                return Ok((entry.modBaseAddr as u64, entry.modBaseSize as usize));
            }
            // SAFETY: as above.
            next = unsafe { Module32NextW(snapshot.0, &mut entry) };
        }

        Err(Error::ProcessOpenFailed(format!(
            "module {module_name} not found in PID {pid}"
        )))
    }

    /// Terminate every process whose executable name matches. Returns how many
    /// were signalled.
    pub fn terminate_by_name(process_name: &str) -> Result<usize> {
        let mut terminated = 0;
        for (pid, name) in list_processes()? {
            if !name.eq_ignore_ascii_case(process_name) {
                continue;
            }
            // SAFETY: no pointer arguments; the handle is closed below.
            let handle = match unsafe { OpenProcess(PROCESS_TERMINATE, false, pid) } {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::debug!("Cannot open PID {} for termination: {}", pid, e);
                    continue;
                }
            };
            // SAFETY: `handle` is a live process handle with PROCESS_TERMINATE.
            if unsafe { TerminateProcess(handle, 1) }.is_ok() {
                terminated += 1;
            }
            // SAFETY: closed exactly once.
            let _ = unsafe { CloseHandle(handle) };
        }
        Ok(terminated)
    }
}
