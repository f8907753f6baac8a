mod bytes;
pub mod chain;
mod handle;
pub mod layout;
mod provider;
mod reader;

// Mock memory and processes for testing
#[cfg(test)]
pub mod mock;

pub use bytes::{decode_utf16_fixed, le_array};
pub use chain::{ChainWalk, HopFailure, PointerChain, walk};
pub use handle::*;
pub use provider::{AttachedProcess, ProcessInfo, ProcessProvider, SystemProcesses};
pub use reader::ReadMemory;

#[cfg(test)]
pub use mock::{MockMemoryBuilder, MockMemoryReader, MockProcess, MockProcessProvider};
