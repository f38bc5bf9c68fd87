//! Block compression codecs.
//!
//! Each SSTable block is independently compressed (or not); the block
//! trailer records which codec produced it, so readers need no table-wide
//! setting. Unsupported or unprofitable compression degrades to storing
//! the raw bytes — never to an error.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use crate::error::{Error, Result};

// ------------------------------------------------------------------------------------------------
// CompressionType
// ------------------------------------------------------------------------------------------------

/// Codec identifier stored in each block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Snappy = 1,
    Zstd = 2,
}

impl CompressionType {
    pub(crate) fn from_u8(v: u8) -> Option<CompressionType> {
        match v {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Codec entry points
// ------------------------------------------------------------------------------------------------

/// Compresses `raw` with the requested codec.
///
/// `Err` here means "store uncompressed", not a failed operation; the
/// table builder treats it as a fallback signal.
pub(crate) fn compress(t: CompressionType, raw: &[u8], level: i32) -> Result<Vec<u8>> {
    match t {
        CompressionType::None => Ok(raw.to_vec()),
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(raw)
            .map_err(|e| Error::not_supported(format!("snappy compression failed: {e}"))),
        CompressionType::Zstd => zstd::stream::encode_all(raw, level)
            .map_err(|e| Error::not_supported(format!("zstd compression failed: {e}"))),
    }
}

/// Decompresses block contents read from disk.
pub(crate) fn decompress(t: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match t {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|_| Error::corruption("corrupted snappy compressed block")),
        CompressionType::Zstd => zstd::stream::decode_all(data)
            .map_err(|_| Error::corruption("corrupted zstd compressed block")),
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
