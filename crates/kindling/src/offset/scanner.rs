//! Wildcard byte-pattern scanning (AOB scan) over module images

use tracing::debug;

use crate::config::scan::{CHUNK_SIZE, MAX_MODULE_SIZE, MIN_ROOT_ADDRESS};
use crate::error::{Error, Result};
use crate::memory::ReadMemory;
use crate::offset::CodeSignature;

/// Offset of the first occurrence of `pattern` in `buffer`.
///
/// `None` entries in the pattern match any byte. Returns `None` for an empty
/// pattern or when there is no match.
pub fn scan(buffer: &[u8], pattern: &[Option<u8>]) -> Option<usize> {
    if pattern.is_empty() || buffer.len() < pattern.len() {
        return None;
    }
    let last = buffer.len() - pattern.len();

    // Anchor on the first fixed byte so memchr can skip through the buffer.
    let Some((anchor, anchor_byte)) = pattern
        .iter()
        .enumerate()
        .find_map(|(i, b)| b.map(|value| (i, value)))
    else {
        return Some(0);
    };

    // A hit at `pos` past the anchor means the pattern would start at `pos`.
    memchr::memchr_iter(anchor_byte, &buffer[anchor..])
        .take_while(|&start| start <= last)
        .find(|&start| matches_at(buffer, start, pattern))
}

fn matches_at(buffer: &[u8], start: usize, pattern: &[Option<u8>]) -> bool {
    pattern
        .iter()
        .zip(&buffer[start..start + pattern.len()])
        .all(|(expected, actual)| expected.is_none_or(|value| value == *actual))
}

/// Absolute address of the first match of `pattern` inside the module image
/// `[base, base + size)`.
///
/// The image is read in chunks that overlap by `pattern.len() - 1` bytes, so
/// matches crossing a chunk border are still found. Unreadable chunks are
/// skipped; the scan only fails when nothing at all could be read.
pub fn scan_module<R: ReadMemory + ?Sized>(
    reader: &R,
    base: u64,
    size: usize,
    pattern: &[Option<u8>],
) -> Result<Option<u64>> {
    scan_module_chunked(reader, base, size, pattern, CHUNK_SIZE)
}

fn scan_module_chunked<R: ReadMemory + ?Sized>(
    reader: &R,
    base: u64,
    size: usize,
    pattern: &[Option<u8>],
    chunk_size: usize,
) -> Result<Option<u64>> {
    let size = size.min(MAX_MODULE_SIZE);
    let keep = pattern.len().saturating_sub(1);
    let mut tail: Vec<u8> = Vec::new();
    let mut offset = 0usize;
    let mut any_read = false;
    let mut last_error = None;

    while offset < size {
        let read_size = (size - offset).min(chunk_size);
        let addr = base + offset as u64;

        let chunk = match reader.read_bytes(addr, read_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(
                    "Skipping unreadable chunk at 0x{:X} ({:#x} bytes): {}",
                    addr, read_size, e
                );
                last_error = Some(e);
                tail.clear();
                offset += read_size;
                continue;
            }
        };
        any_read = true;

        let mut data = Vec::with_capacity(tail.len() + chunk.len());
        data.extend_from_slice(&tail);
        data.extend_from_slice(&chunk);
        let data_base = addr - tail.len() as u64;

        if let Some(pos) = scan(&data, pattern) {
            return Ok(Some(data_base + pos as u64));
        }

        tail = data[data.len().saturating_sub(keep)..].to_vec();
        offset += read_size;
    }

    if !any_read {
        return Err(last_error.unwrap_or(Error::MemoryReadFailed {
            address: base,
            message: "module image is empty".to_string(),
        }));
    }
    Ok(None)
}

/// Resolve the global a [`CodeSignature`] points at inside the module image.
///
/// A missing signature is reported as [`Error::SignatureNotFound`]: the binary
/// no longer matches the configured layout. Read failures while following the
/// match (including a null global, common while the game is still loading)
/// are reported as [`Error::MemoryReadFailed`].
pub fn resolve_signature<R: ReadMemory + ?Sized>(
    reader: &R,
    base: u64,
    size: usize,
    signature: &CodeSignature,
) -> Result<u64> {
    let pattern = signature.pattern_bytes()?;
    let match_address =
        scan_module(reader, base, size, &pattern)?.ok_or_else(|| Error::SignatureNotFound {
            pattern: signature.pattern.clone(),
        })?;
    debug!(
        "Signature matched at 0x{:X} (module+0x{:X})",
        match_address,
        match_address - base
    );

    let displacement = reader.read_i32(signature.displacement_address(match_address))?;
    let mut target = signature.target_from_displacement(match_address, displacement);

    if signature.deref {
        let global = target;
        target = reader.read_u64(global)?;
        debug!("Global at 0x{:X} holds 0x{:X}", global, target);
    }
    target = target.wrapping_add_signed(signature.addend);

    if target < MIN_ROOT_ADDRESS {
        return Err(Error::MemoryReadFailed {
            address: target,
            message: "resolved root pointer is null".to_string(),
        });
    }

    Ok(target)
}
