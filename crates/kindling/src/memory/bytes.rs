//! Byte-level helpers shared by the readers

use encoding_rs::UTF_16LE;

use crate::error::{Error, Result};

/// Copy the first `N` bytes of `bytes` into an array, failing on a short read.
pub fn le_array<const N: usize>(bytes: &[u8], address: u64) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| Error::MemoryReadFailed {
            address,
            message: format!("short read: expected {} bytes, got {}", N, bytes.len()),
        })
}

/// Decode a fixed-size, NUL-padded UTF-16LE buffer.
///
/// Returns `None` when the buffer is not exactly `expected_len` bytes long, has
/// an odd length, contains invalid UTF-16, or holds no characters before the
/// first NUL. Callers must treat `None` as "unreadable", not as an empty name.
pub fn decode_utf16_fixed(bytes: &[u8], expected_len: usize) -> Option<String> {
    if bytes.len() != expected_len || bytes.len() % 2 != 0 {
        return None;
    }

    let units = bytes
        .chunks_exact(2)
        .position(|unit| unit == [0, 0])
        .unwrap_or(bytes.len() / 2);
    if units == 0 {
        return None;
    }

    UTF_16LE
        .decode_without_bom_handling_and_without_replacement(&bytes[..units * 2])
        .map(|text| text.into_owned())
}
