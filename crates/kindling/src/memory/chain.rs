//! Pointer chain walking with per-hop fault isolation
//!
//! A chain `[a, b, c]` applied to `base` computes `*(*(*(base + a) + b) + c)`,
//! where `*` reads a 64-bit pointer from the foreign process.
//!
//! Structures routinely disappear for a few frames (loading screens, area
//! transitions), so a failed hop does not abort the walk: it is recorded as a
//! [`HopFailure`] and the walk continues from the last good address, exactly as
//! if that hop had been left out of the chain. Callers that need certainty check
//! [`ChainWalk::is_clean`] or validate the result with a follow-up read.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::ReadMemory;

/// Ordered list of signed byte offsets, each followed by a pointer dereference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointerChain(Vec<i64>);

impl PointerChain {
    pub fn new(offsets: impl Into<Vec<i64>>) -> Self {
        Self(offsets.into())
    }

    pub fn offsets(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Chain that first follows `self`, then `next`.
    pub fn then(&self, next: &PointerChain) -> PointerChain {
        let mut offsets = self.0.clone();
        offsets.extend_from_slice(&next.0);
        PointerChain(offsets)
    }

    pub fn walk<R: ReadMemory + ?Sized>(&self, reader: &R, base: u64) -> ChainWalk {
        walk(reader, base, &self.0)
    }
}

impl From<Vec<i64>> for PointerChain {
    fn from(offsets: Vec<i64>) -> Self {
        Self(offsets)
    }
}

impl From<&[i64]> for PointerChain {
    fn from(offsets: &[i64]) -> Self {
        Self(offsets.to_vec())
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, offset) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *offset < 0 {
                write!(f, "-0x{:X}", offset.unsigned_abs())?;
            } else {
                write!(f, "0x{:X}", offset)?;
            }
        }
        write!(f, "]")
    }
}

/// A hop whose pointer read failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopFailure {
    /// Zero-based index of the hop within the chain
    pub hop: usize,
    pub offset: i64,
    /// Address the read was attempted at (`previous + offset`)
    pub address: u64,
    pub message: String,
}

/// Result of walking a chain: the final address plus any tolerated failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWalk {
    pub address: u64,
    pub failures: Vec<HopFailure>,
}

impl ChainWalk {
    /// True when every hop was read successfully.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Follow `offsets` from `base`, skipping hops whose read fails.
pub fn walk<R: ReadMemory + ?Sized>(reader: &R, base: u64, offsets: &[i64]) -> ChainWalk {
    let mut address = base;
    let mut failures = Vec::new();

    for (hop, &offset) in offsets.iter().enumerate() {
        let target = address.wrapping_add_signed(offset);
        match reader.read_u64(target) {
            Ok(next) => address = next,
            Err(e) => {
                debug!(
                    "Pointer hop {} (+0x{:X}) failed at 0x{:X}, keeping 0x{:X}: {}",
                    hop, offset, target, address, e
                );
                failures.push(HopFailure {
                    hop,
                    offset,
                    address: target,
                    message: e.to_string(),
                });
            }
        }
    }

    ChainWalk { address, failures }
}
