//! Synthetic address spaces and processes for tests

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::memory::{AttachedProcess, ProcessInfo, ProcessProvider, ReadMemory};

/// Builder for a sparse, byte-addressed mock memory.
///
/// Only bytes that were explicitly written are mapped; reads touching any
/// other byte fail like a read of unmapped foreign memory.
#[derive(Debug, Clone, Default)]
pub struct MockMemoryBuilder {
    base: u64,
    bytes: BTreeMap<u64, u8>,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_address(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn bytes(mut self, address: u64, data: &[u8]) -> Self {
        for (i, byte) in data.iter().enumerate() {
            self.bytes.insert(address + i as u64, *byte);
        }
        self
    }

    pub fn u64(self, address: u64, value: u64) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn i32(self, address: u64, value: i32) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn f32(self, address: u64, value: f32) -> Self {
        self.bytes(address, &value.to_le_bytes())
    }

    pub fn build(self) -> MockMemoryReader {
        MockMemoryReader {
            base: self.base,
            bytes: RefCell::new(self.bytes),
            reads: Cell::new(0),
        }
    }
}

/// Mock memory produced by [`MockMemoryBuilder`]. Counts every read.
#[derive(Debug)]
pub struct MockMemoryReader {
    base: u64,
    bytes: RefCell<BTreeMap<u64, u8>>,
    reads: Cell<usize>,
}

impl MockMemoryReader {
    /// Number of `read_bytes` calls so far.
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn reset_read_count(&self) {
        self.reads.set(0);
    }

    /// Overwrite memory in place, as the game would between frames.
    pub fn poke(&self, address: u64, data: &[u8]) {
        let mut bytes = self.bytes.borrow_mut();
        for (i, byte) in data.iter().enumerate() {
            bytes.insert(address + i as u64, *byte);
        }
    }

    pub fn poke_i32(&self, address: u64, value: i32) {
        self.poke(address, &value.to_le_bytes());
    }

    pub fn poke_f32(&self, address: u64, value: f32) {
        self.poke(address, &value.to_le_bytes());
    }

    /// Unmap `len` bytes starting at `address`.
    pub fn unmap(&self, address: u64, len: usize) {
        let mut bytes = self.bytes.borrow_mut();
        for i in 0..len as u64 {
            bytes.remove(&(address + i));
        }
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        self.reads.set(self.reads.get() + 1);
        let bytes = self.bytes.borrow();
        (0..size as u64)
            .map(|i| {
                bytes
                    .get(&address.wrapping_add(i))
                    .copied()
                    .ok_or_else(|| Error::MemoryReadFailed {
                        address,
                        message: format!("unmapped byte at 0x{:X}", address.wrapping_add(i)),
                    })
            })
            .collect()
    }

    fn base_address(&self) -> u64 {
        self.base
    }
}

#[derive(Debug)]
struct MockProcessState {
    process_name: String,
    pid: Option<u32>,
    module_size: usize,
    readable: bool,
    memory: Rc<MockMemoryReader>,
    lookups: usize,
    opens: usize,
    terminations: usize,
}

/// Simulated process table with one target process that can crash and restart.
///
/// Clones share state, so a test can keep one clone to drive the simulation
/// while the code under test owns another.
#[derive(Debug, Clone)]
pub struct MockProcessProvider {
    state: Rc<RefCell<MockProcessState>>,
}

impl MockProcessProvider {
    pub fn new(process_name: &str, memory: MockMemoryReader, module_size: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockProcessState {
                process_name: process_name.to_string(),
                pid: None,
                module_size,
                readable: true,
                memory: Rc::new(memory),
                lookups: 0,
                opens: 0,
                terminations: 0,
            })),
        }
    }

    /// Start (or restart under a new PID) the simulated process.
    pub fn start(&self, pid: u32) {
        let mut state = self.state.borrow_mut();
        state.pid = Some(pid);
        state.readable = true;
    }

    /// Kill the simulated process: it disappears and open handles stop reading.
    pub fn stop(&self) {
        let mut state = self.state.borrow_mut();
        state.pid = None;
        state.readable = false;
    }

    /// Keep the process listed but make every read through existing handles fail.
    pub fn set_readable(&self, readable: bool) {
        self.state.borrow_mut().readable = readable;
    }

    pub fn memory(&self) -> Rc<MockMemoryReader> {
        Rc::clone(&self.state.borrow().memory)
    }

    pub fn open_count(&self) -> usize {
        self.state.borrow().opens
    }

    pub fn lookup_count(&self) -> usize {
        self.state.borrow().lookups
    }

    pub fn termination_count(&self) -> usize {
        self.state.borrow().terminations
    }
}

impl ProcessProvider for MockProcessProvider {
    type Process = MockProcess;

    fn find_pid(&self, process_name: &str) -> Result<Option<u32>> {
        let mut state = self.state.borrow_mut();
        state.lookups += 1;
        if state.process_name.eq_ignore_ascii_case(process_name) {
            Ok(state.pid)
        } else {
            Ok(None)
        }
    }

    fn open(&self, pid: u32, _module_name: &str) -> Result<MockProcess> {
        let mut state = self.state.borrow_mut();
        if state.pid != Some(pid) {
            return Err(Error::ProcessNotFound(format!("PID {pid}")));
        }
        state.opens += 1;
        Ok(MockProcess {
            info: ProcessInfo {
                pid,
                base_address: state.memory.base_address(),
                module_size: state.module_size,
            },
            provider: self.clone(),
        })
    }

    fn terminate_all(&self, process_name: &str) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.pid.is_some() && state.process_name.eq_ignore_ascii_case(process_name) {
            state.pid = None;
            state.readable = false;
            state.terminations += 1;
            return Ok(1);
        }
        Ok(0)
    }
}

/// Handle to the simulated process. Reads fail once the process was stopped
/// or restarted under a different PID.
#[derive(Debug)]
pub struct MockProcess {
    info: ProcessInfo,
    provider: MockProcessProvider,
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let state = self.provider.state.borrow();
        if !state.readable || state.pid != Some(self.info.pid) {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("PID {} is gone", self.info.pid),
            });
        }
        state.memory.read_bytes(address, size)
    }

    fn base_address(&self) -> u64 {
        self.info.base_address
    }
}

impl AttachedProcess for MockProcess {
    fn info(&self) -> ProcessInfo {
        self.info
    }
}
