//! CRC32C (Castagnoli) checksums with storage masking.
//!
//! Every persisted checksum in the engine — WAL record headers and SSTable
//! block trailers — is a CRC32C that has been *masked* before storage.
//! Masking rotates the CRC and adds a constant so that data which itself
//! embeds CRCs (for example a WAL stored inside another WAL) does not
//! produce the degenerate checksum-of-checksum pattern.

use crc32c::{crc32c, crc32c_append};

const MASK_DELTA: u32 = 0xA282_EAD8;

/// CRC32C of `data`.
#[inline]
pub fn value(data: &[u8]) -> u32 {
    crc32c(data)
}

/// Extends `init` — a CRC previously returned by [`value`] or [`extend`]
/// — with `data`, as if the two byte strings had been concatenated.
#[inline]
pub fn extend(init: u32, data: &[u8]) -> u32 {
    crc32c_append(init, data)
}

/// Masks a CRC for storage.
#[inline]
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverts [`mask`].
#[inline]
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}
