//! zstd compression with a marker prefix and a decompression ceiling.

use std::io::Read;

use crate::error::CoreError;

/// Prefix marking a compressed message or dump.
///
/// Encoded dicts always start with `d`, so the marker is unambiguous.
pub const COMPRESSED_PREFIX: &[u8] = b"z";

/// Default zstd level for pushes and dumps.
pub const DEFAULT_LEVEL: i32 = 1;

/// Compress `data` with zstd at `level`, prepending `prefix` to the output.
pub fn compress(data: &[u8], level: i32, prefix: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut out = prefix.to_vec();
    let compressed = zstd::encode_all(data, level)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decompress a zstd frame, refusing to produce more than `max_size` bytes.
///
/// Returns `None` if the output would exceed `max_size` or the frame is
/// corrupt. The prefix, if any, must already be stripped.
pub fn decompress(data: &[u8], max_size: usize) -> Option<Vec<u8>> {
    let decoder = zstd::Decoder::new(data).ok()?;
    let limit = u64::try_from(max_size).ok()?.saturating_add(1);
    let mut out = Vec::new();
    decoder.take(limit).read_to_end(&mut out).ok()?;
    if out.len() > max_size {
        return None;
    }
    Some(out)
}

/// Strip the compression marker if present.
pub fn strip_prefix(data: &[u8]) -> Option<&[u8]> {
    data.strip_prefix(COMPRESSED_PREFIX)
}

/// Undo optional compression on an incoming payload.
///
/// Uncompressed payloads are returned as-is; compressed ones are inflated
/// under the `max_size` ceiling.
pub fn maybe_decompress(data: &[u8], max_size: usize) -> Option<std::borrow::Cow<'_, [u8]>> {
    match strip_prefix(data) {
        Some(frame) => decompress(frame, max_size).map(std::borrow::Cow::Owned),
        None => Some(std::borrow::Cow::Borrowed(data)),
    }
}
