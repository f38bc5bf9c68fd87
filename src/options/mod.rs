//! Engine configuration.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use crate::cache::LruCache;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::compression::CompressionType;
use crate::filter::FilterPolicy;
use crate::sstable::block::Block;

/// The block cache holds decoded data blocks keyed by
/// `cache_id ‖ block_offset`.
pub type BlockCache = LruCache<Arc<Block>>;

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Knobs affecting how tables are built and read.
///
/// Cloning is cheap; the heavyweight members are shared behind `Arc`.
#[derive(Clone)]
pub struct Options {
    /// Total order over user keys. Must match the comparator every
    /// existing table was built with.
    pub comparator: Arc<dyn Comparator>,

    /// Bytes buffered in the memtable before the owner rotates it.
    pub write_buffer_size: usize,

    /// Uncompressed target size of one data block.
    pub block_size: usize,

    /// Entries between restart points inside a block.
    pub block_restart_interval: usize,

    /// Codec applied to data blocks; degrades to `None` per block when
    /// compression does not pay.
    pub compression: CompressionType,

    /// Level passed to zstd when `compression == Zstd`.
    pub zstd_compression_level: i32,

    /// Verify checksums aggressively and surface every failure instead of
    /// limping on.
    pub paranoid_checks: bool,

    /// Cache of decoded data blocks shared across open tables.
    pub block_cache: Option<Arc<BlockCache>>,

    /// Per-table key filter; `None` disables filter blocks.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            comparator: Arc::new(BytewiseComparator),
            write_buffer_size: 4 * 1024 * 1024,
            block_size: 4096,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            zstd_compression_level: 1,
            paranoid_checks: false,
            block_cache: None,
            filter_policy: None,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// ReadOptions
// ------------------------------------------------------------------------------------------------

/// Per-read knobs.
#[derive(Clone)]
pub struct ReadOptions {
    /// Check block CRCs on every read.
    pub verify_checksums: bool,

    /// Insert blocks loaded by this read into the block cache. Bulk scans
    /// turn this off to avoid flushing the cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}
