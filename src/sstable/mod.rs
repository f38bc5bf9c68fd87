//! # SSTable Module
//!
//! Immutable, block-structured sorted tables: the on-disk format, its
//! builder, and its reader.
//!
//! ## On-disk layout
//!
//! ```text
//!     +--------------+-----------+
//!     | data block 1 | trailer 5B |
//!     +--------------+-----------+
//!     | data block 2 | trailer 5B |
//!     |     ...                  |
//!     +--------------+-----------+
//!     | filter block | trailer 5B |      (optional)
//!     +--------------+-----------+
//!     | metaindex    | trailer 5B |
//!     +--------------+-----------+
//!     | index block  | trailer 5B |
//!     +--------------+-----------+
//!     | footer (48 bytes)        |
//!     +--------------------------+
//! ```
//!
//! - Every block is followed by a 5-byte trailer: the compression type and
//!   a masked CRC32C over `payload ‖ type`.
//! - The index block maps separator keys to [`BlockHandle`]s of data
//!   blocks; it uses restart interval 1 so every key is seekable.
//! - The metaindex block maps `"filter.<policy>"` to the filter block's
//!   handle.
//! - The footer is fixed-size: two handles, zero padding, and the magic
//!   number, always the last 48 bytes of the file.
//!
//! ## Sub-modules
//!
//! - [`block`] — prefix-compressed block builder/reader.
//! - [`filter`] — filter-block builder/reader.
//! - [`builder`] — [`TableBuilder`].
//! - [`iterator`] — the two-level table iterator.
//!
//! ## Concurrency
//!
//! A [`Table`] is immutable after `open` and safe to share; the underlying
//! file must support concurrent positional reads (the default mmap-backed
//! file does).

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod block;
pub mod builder;
pub mod filter;
pub mod iterator;

pub use builder::TableBuilder;
pub use iterator::TableIterator;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::{
    MAX_VARINT64_LEN, crc, decode_fixed32, get_varint64, put_fixed64, put_varint64,
};
use crate::compression::{self, CompressionType};
use crate::env::{RandomAccessFile, read_exact_at};
use crate::error::{Error, Result};
use crate::iterator::Iter;
use crate::options::{Options, ReadOptions};

use block::Block;
use filter::FilterBlockReader;

// ------------------------------------------------------------------------------------------------
// Format constants
// ------------------------------------------------------------------------------------------------

/// Identifies a file as an SSTable; stored little-endian at the very end.
pub(crate) const TABLE_MAGIC_NUMBER: u64 = 0xDB47_7524_8B80_FB57;

/// Compression type (1) + masked CRC32C (4) after every block.
pub(crate) const BLOCK_TRAILER_SIZE: usize = 5;

/// Maximum encoded length of a [`BlockHandle`].
pub(crate) const MAX_ENCODED_HANDLE_LENGTH: usize = 2 * MAX_VARINT64_LEN;

/// Exact encoded length of the [`Footer`].
pub(crate) const FOOTER_ENCODED_LENGTH: usize = 2 * MAX_ENCODED_HANDLE_LENGTH + 8;

// ------------------------------------------------------------------------------------------------
// BlockHandle
// ------------------------------------------------------------------------------------------------

/// Names a byte range inside the table file, excluding the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64) -> BlockHandle {
        BlockHandle { offset, size }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// Appends the varint encoding of this handle to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Decodes a handle, returning it and the bytes consumed.
    pub fn decode_from(src: &[u8]) -> Result<(BlockHandle, usize)> {
        let (offset, n) = get_varint64(src).ok_or_else(|| Error::corruption("bad block handle"))?;
        let (size, m) =
            get_varint64(&src[n..]).ok_or_else(|| Error::corruption("bad block handle"))?;
        Ok((BlockHandle { offset, size }, n + m))
    }
}

// ------------------------------------------------------------------------------------------------
// Footer
// ------------------------------------------------------------------------------------------------

/// The fixed-size tail of every table file.
#[derive(Debug)]
pub struct Footer {
    metaindex_handle: BlockHandle,
    index_handle: BlockHandle,
}

impl Footer {
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Footer {
        Footer {
            metaindex_handle,
            index_handle,
        }
    }

    /// Serializes to exactly [`FOOTER_ENCODED_LENGTH`] bytes.
    pub fn encoded(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(FOOTER_ENCODED_LENGTH);
        self.metaindex_handle.encode_to(&mut dst);
        self.index_handle.encode_to(&mut dst);
        dst.resize(2 * MAX_ENCODED_HANDLE_LENGTH, 0);
        put_fixed64(&mut dst, TABLE_MAGIC_NUMBER);
        debug_assert_eq!(dst.len(), FOOTER_ENCODED_LENGTH);
        dst
    }

    /// Decodes and validates the magic number.
    pub fn decode_from(src: &[u8]) -> Result<Footer> {
        if src.len() < FOOTER_ENCODED_LENGTH {
            return Err(Error::corruption("footer too short"));
        }
        let magic = crate::codec::decode_fixed64(&src[FOOTER_ENCODED_LENGTH - 8..]);
        if magic != TABLE_MAGIC_NUMBER {
            return Err(Error::corruption("not an sstable (bad magic number)"));
        }
        let (metaindex_handle, n) = BlockHandle::decode_from(src)?;
        let (index_handle, _) = BlockHandle::decode_from(&src[n..])?;
        Ok(Footer {
            metaindex_handle,
            index_handle,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// Block I/O
// ------------------------------------------------------------------------------------------------

/// Reads and decodes the block named by `handle`: optional CRC check,
/// decompression per the trailer's type byte.
pub(crate) fn read_block(
    file: &dyn RandomAccessFile,
    options: &ReadOptions,
    handle: &BlockHandle,
) -> Result<Vec<u8>> {
    let n = handle.size as usize;
    let mut buf = vec![0u8; n + BLOCK_TRAILER_SIZE];
    read_exact_at(file, handle.offset, &mut buf)?;

    if options.verify_checksums {
        let expected = crc::unmask(decode_fixed32(&buf[n + 1..]));
        let actual = crc::value(&buf[..n + 1]);
        if actual != expected {
            return Err(Error::corruption("block checksum mismatch"));
        }
    }

    let t = CompressionType::from_u8(buf[n])
        .ok_or_else(|| Error::corruption("bad block compression type"))?;
    match t {
        CompressionType::None => {
            buf.truncate(n);
            Ok(buf)
        }
        _ => compression::decompress(t, &buf[..n]),
    }
}

// ------------------------------------------------------------------------------------------------
// Table
// ------------------------------------------------------------------------------------------------

/// An open, immutable SSTable.
pub struct Table {
    options: Options,
    file: Box<dyn RandomAccessFile>,
    /// Distinguishes this table's blocks in the shared block cache.
    cache_id: u64,
    metaindex_handle: BlockHandle,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("cache_id", &self.cache_id)
            .field("metaindex_handle", &self.metaindex_handle)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Opens a table over `file`, whose total length is `size` bytes.
    ///
    /// Reads the footer, the index block, and — when a filter policy is
    /// configured and the table carries a matching filter — the filter
    /// block. The table takes ownership of the file.
    pub fn open(options: Options, file: Box<dyn RandomAccessFile>, size: u64) -> Result<Arc<Table>> {
        if size < FOOTER_ENCODED_LENGTH as u64 {
            return Err(Error::corruption("file is too short to be an sstable"));
        }

        let mut footer_buf = [0u8; FOOTER_ENCODED_LENGTH];
        read_exact_at(
            file.as_ref(),
            size - FOOTER_ENCODED_LENGTH as u64,
            &mut footer_buf,
        )?;
        let footer = Footer::decode_from(&footer_buf)?;

        let read_options = ReadOptions {
            verify_checksums: options.paranoid_checks,
            fill_cache: false,
        };
        let index_contents = read_block(file.as_ref(), &read_options, &footer.index_handle)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        let cache_id = options
            .block_cache
            .as_ref()
            .map_or(0, |cache| cache.new_id());

        let mut table = Table {
            options,
            file,
            cache_id,
            metaindex_handle: footer.metaindex_handle,
            index_block,
            filter: None,
        };
        table.read_meta(&footer)?;
        debug!(size, has_filter = table.filter.is_some(), "table opened");
        Ok(Arc::new(table))
    }

    /// Loads the filter block named in the metaindex, if one matches the
    /// configured policy. Failures here lose the filter, not the table —
    /// except under `paranoid_checks`.
    fn read_meta(&mut self, footer: &Footer) -> Result<()> {
        let Some(policy) = self.options.filter_policy.clone() else {
            return Ok(());
        };

        let read_options = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
        };
        let contents = match read_block(
            self.file.as_ref(),
            &read_options,
            &footer.metaindex_handle,
        ) {
            Ok(contents) => contents,
            Err(e) => {
                if self.options.paranoid_checks {
                    return Err(e);
                }
                warn!(error = %e, "metaindex unreadable; proceeding without filter");
                return Ok(());
            }
        };
        let meta = match Block::new(contents) {
            Ok(block) => Arc::new(block),
            Err(e) => {
                if self.options.paranoid_checks {
                    return Err(e);
                }
                return Ok(());
            }
        };

        // Metaindex keys are plain strings, compared bytewise no matter
        // what the table comparator is.
        let mut iter = meta.iter(Arc::new(crate::comparator::BytewiseComparator));
        let key = format!("filter.{}", policy.name());
        iter.seek(key.as_bytes());
        if iter.valid() && iter.key() == key.as_bytes() {
            let value = iter.value().to_vec();
            if let Err(e) = self.read_filter(&value) {
                if self.options.paranoid_checks {
                    return Err(e);
                }
                warn!(error = %e, "filter block unreadable; proceeding without filter");
            }
        }
        Ok(())
    }

    fn read_filter(&mut self, filter_handle_value: &[u8]) -> Result<()> {
        let (handle, _) = BlockHandle::decode_from(filter_handle_value)?;
        let read_options = ReadOptions {
            verify_checksums: self.options.paranoid_checks,
            fill_cache: false,
        };
        let contents = read_block(self.file.as_ref(), &read_options, &handle)?;
        let policy = self
            .options
            .filter_policy
            .clone()
            .expect("read_filter requires a policy");
        self.filter = Some(FilterBlockReader::new(policy, contents));
        Ok(())
    }

    /// Loads the data block for `handle`, via the block cache when one is
    /// configured.
    pub(crate) fn block_reader(
        &self,
        read_options: &ReadOptions,
        handle: &BlockHandle,
    ) -> Result<Arc<Block>> {
        let Some(cache) = &self.options.block_cache else {
            let contents = read_block(self.file.as_ref(), read_options, handle)?;
            return Ok(Arc::new(Block::new(contents)?));
        };

        // Cache key: cache_id ‖ block_offset, both fixed64.
        let mut cache_key = Vec::with_capacity(16);
        put_fixed64(&mut cache_key, self.cache_id);
        put_fixed64(&mut cache_key, handle.offset);

        if let Some(cache_handle) = cache.lookup(&cache_key) {
            let block = Arc::clone(cache.value(&cache_handle));
            cache.release(cache_handle);
            trace!(offset = handle.offset, "block cache hit");
            return Ok(block);
        }

        let contents = read_block(self.file.as_ref(), read_options, handle)?;
        let block = Arc::new(Block::new(contents)?);
        if read_options.fill_cache {
            let charge = block.size();
            let cache_handle = cache.insert(&cache_key, Arc::clone(&block), charge, None);
            cache.release(cache_handle);
        }
        Ok(block)
    }

    /// Iterator over the whole table in key order. Takes a shared
    /// handle; clone the `Arc` at the call site to keep using the table.
    pub fn iter(self: Arc<Self>, read_options: ReadOptions) -> TableIterator {
        TableIterator::new(self, read_options)
    }

    /// Point lookup: seeks `key` and, if an entry at or after it exists in
    /// the covering data block, hands `(found_key, found_value)` to
    /// `handler`. The filter block can prove the key absent without
    /// touching the data block at all.
    pub fn get(
        &self,
        read_options: &ReadOptions,
        key: &[u8],
        handler: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<()> {
        let mut index_iter = Arc::clone(&self.index_block).iter(Arc::clone(&self.options.comparator));
        index_iter.seek(key);
        if index_iter.valid() {
            let handle_value = index_iter.value().to_vec();
            let (handle, _) = BlockHandle::decode_from(&handle_value)?;

            if let Some(filter) = &self.filter {
                if !filter.key_may_match(handle.offset, key) {
                    // Filter says no: skip the block read entirely.
                    trace!(offset = handle.offset, "filter excluded key");
                    return index_iter.status();
                }
            }

            let block = self.block_reader(read_options, &handle)?;
            let mut block_iter = block.iter(Arc::clone(&self.options.comparator));
            block_iter.seek(key);
            if block_iter.valid() {
                handler(block_iter.key(), block_iter.value());
            }
            block_iter.status()?;
        }
        index_iter.status()
    }

    /// Approximate file offset where `key`'s data would live. Keys past
    /// the last entry map near the end of the file.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        let mut index_iter = Arc::clone(&self.index_block).iter(Arc::clone(&self.options.comparator));
        index_iter.seek(key);
        if index_iter.valid() {
            if let Ok((handle, _)) = BlockHandle::decode_from(index_iter.value()) {
                return handle.offset;
            }
        }
        // Past the last key (or undecodable): the metaindex offset is a
        // good "end of data" approximation.
        self.metaindex_handle.offset
    }

    pub(crate) fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn index_block(&self) -> &Arc<Block> {
        &self.index_block
    }
}
