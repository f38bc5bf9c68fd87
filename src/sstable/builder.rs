//! Table builder: streams sorted entries into the SSTable format.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::{crc, put_fixed32};
use crate::compression::{self, CompressionType};
use crate::env::WritableFile;
use crate::error::{Error, Result};
use crate::options::Options;

use super::block::BlockBuilder;
use super::filter::FilterBlockBuilder;
use super::{BLOCK_TRAILER_SIZE, BlockHandle, Footer};

// ------------------------------------------------------------------------------------------------
// TableBuilder
// ------------------------------------------------------------------------------------------------

/// Builds an SSTable on a writable file.
///
/// Keys must be added in strictly increasing order under
/// `options.comparator`. The caller finishes with exactly one of
/// [`finish`](TableBuilder::finish) or [`abandon`](TableBuilder::abandon),
/// then syncs/closes the file itself.
pub struct TableBuilder<W: WritableFile> {
    options: Options,
    file: W,
    offset: u64,
    status: Option<Error>,

    data_block: BlockBuilder,
    /// Index entries point at whole data blocks; restart interval 1 keeps
    /// every separator key directly seekable.
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,

    last_key: Vec<u8>,
    num_entries: u64,
    closed: bool,

    /// A data block was finished but its index entry is deferred until the
    /// next key arrives, so the separator can be shortened against it.
    pending_index_entry: bool,
    pending_handle: BlockHandle,

    compressed_output: Vec<u8>,
}

impl<W: WritableFile> TableBuilder<W> {
    pub fn new(options: Options, file: W) -> TableBuilder<W> {
        let mut filter_block = options
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);
        if let Some(filter) = &mut filter_block {
            filter.start_block(0);
        }
        TableBuilder {
            data_block: BlockBuilder::new(
                options.block_restart_interval,
                Arc::clone(&options.comparator),
            ),
            index_block: BlockBuilder::new(1, Arc::clone(&options.comparator)),
            filter_block,
            options,
            file,
            offset: 0,
            status: None,
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
            compressed_output: Vec::new(),
        }
    }

    /// Adjusts options mid-build. Only safe for knobs that do not affect
    /// already-written bytes; changing the comparator is rejected.
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::invalid_argument(
                "changing comparator while building table",
            ));
        }
        // A changed restart interval only applies to future data
        // blocks; each block is self-describing.
        self.data_block = BlockBuilder::new(
            options.block_restart_interval,
            Arc::clone(&options.comparator),
        );
        self.options = options;
        Ok(())
    }

    /// Appends an entry. `key` must sort after every previously-added key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.closed, "add after finish/abandon");
        if !self.ok() {
            return;
        }
        debug_assert!(
            self.num_entries == 0
                || self.options.comparator.compare(key, &self.last_key) == CmpOrdering::Greater,
            "keys added out of order"
        );

        if self.pending_index_entry {
            // First key of a fresh block: the previous block's index key
            // only needs to separate its last key from this one.
            debug_assert!(self.data_block.is_empty());
            self.options
                .comparator
                .find_shortest_separator(&mut self.last_key, key);
            let mut handle_encoding = Vec::new();
            self.pending_handle.encode_to(&mut handle_encoding);
            self.index_block.add(&self.last_key, &handle_encoding);
            self.pending_index_entry = false;
        }

        if let Some(filter) = &mut self.filter_block {
            filter.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush();
        }
    }

    /// Closes the current data block and flushes the file.
    pub fn flush(&mut self) {
        debug_assert!(!self.closed);
        if !self.ok() || self.data_block.is_empty() {
            return;
        }
        debug_assert!(!self.pending_index_entry, "flush with index entry pending");

        let mut pending = BlockHandle::default();
        if let Err(e) = self.write_data_block(&mut pending) {
            self.status = Some(e);
            return;
        }
        self.pending_handle = pending;
        self.pending_index_entry = true;
        if let Err(e) = self.file.flush() {
            self.status = Some(e);
            return;
        }
        if let Some(filter) = &mut self.filter_block {
            filter.start_block(self.offset);
        }
    }

    /// Writes all trailing blocks and the footer. The builder is finished
    /// afterwards; only `num_entries`/`file_size` remain meaningful.
    pub fn finish(&mut self) -> Result<()> {
        self.flush();
        debug_assert!(!self.closed);
        self.closed = true;
        self.check_status()?;

        // Filter block (never compressed).
        let mut filter_handle = BlockHandle::default();
        let has_filter = if let Some(mut filter) = self.filter_block.take() {
            let contents = filter.finish().to_vec();
            self.write_raw_block(&contents, CompressionType::None, &mut filter_handle)?;
            true
        } else {
            false
        };

        // Metaindex block.
        let mut metaindex_handle = BlockHandle::default();
        {
            let mut metaindex = BlockBuilder::new(
                self.options.block_restart_interval,
                Arc::clone(&self.options.comparator),
            );
            if has_filter {
                let key = format!(
                    "filter.{}",
                    self.options
                        .filter_policy
                        .as_ref()
                        .expect("filter block implies policy")
                        .name()
                );
                let mut handle_encoding = Vec::new();
                filter_handle.encode_to(&mut handle_encoding);
                metaindex.add(key.as_bytes(), &handle_encoding);
            }
            let contents = metaindex.finish().to_vec();
            self.write_block(&contents, &mut metaindex_handle)?;
        }

        // Index block, with the final pending entry keyed past last_key.
        let mut index_handle = BlockHandle::default();
        {
            if self.pending_index_entry {
                self.options.comparator.find_short_successor(&mut self.last_key);
                let mut handle_encoding = Vec::new();
                self.pending_handle.encode_to(&mut handle_encoding);
                self.index_block.add(&self.last_key, &handle_encoding);
                self.pending_index_entry = false;
            }
            let contents = self.index_block.finish().to_vec();
            self.write_block(&contents, &mut index_handle)?;
        }

        // Footer.
        let footer = Footer::new(metaindex_handle, index_handle).encoded();
        self.file.append(&footer)?;
        self.offset += footer.len() as u64;

        debug!(
            entries = self.num_entries,
            bytes = self.offset,
            "table finished"
        );
        Ok(())
    }

    /// Abandons the build; the file contents are garbage to discard.
    pub fn abandon(&mut self) {
        debug_assert!(!self.closed);
        self.closed = true;
    }

    /// Consumes the builder, handing back the destination file so the
    /// caller can sync and close it.
    pub fn into_file(self) -> W {
        debug_assert!(self.closed, "builder consumed before finish/abandon");
        self.file
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes written so far.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    pub fn status(&self) -> Result<()> {
        self.check_status()
    }

    fn ok(&self) -> bool {
        self.status.is_none()
    }

    fn check_status(&self) -> Result<()> {
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }

    fn write_data_block(&mut self, handle: &mut BlockHandle) -> Result<()> {
        let contents = self.data_block.finish().to_vec();
        let result = self.write_block(&contents, handle);
        self.data_block.reset();
        result
    }

    /// Compresses (when profitable) and writes one block plus trailer.
    fn write_block(&mut self, raw: &[u8], handle: &mut BlockHandle) -> Result<()> {
        let requested = self.options.compression;
        let mut compressed = false;
        if requested != CompressionType::None {
            match compression::compress(requested, raw, self.options.zstd_compression_level) {
                // Keep compression only when it saves at least 12.5%.
                Ok(output) if output.len() < raw.len() - raw.len() / 8 => {
                    self.compressed_output = output;
                    compressed = true;
                }
                Ok(_) => {}
                Err(e) => {
                    // Unsupported codec: store raw.
                    trace!(error = %e, "compression unavailable; storing raw");
                }
            }
        }

        if compressed {
            let contents = std::mem::take(&mut self.compressed_output);
            self.write_raw_block(&contents, requested, handle)?;
        } else {
            self.write_raw_block(raw, CompressionType::None, handle)?;
        }
        Ok(())
    }

    fn write_raw_block(
        &mut self,
        contents: &[u8],
        block_type: CompressionType,
        handle: &mut BlockHandle,
    ) -> Result<()> {
        handle.set_offset(self.offset);
        handle.set_size(contents.len() as u64);
        self.file.append(contents)?;

        let mut trailer = Vec::with_capacity(BLOCK_TRAILER_SIZE);
        trailer.push(block_type as u8);
        let checksum = crc::extend(crc::value(contents), &[block_type as u8]);
        put_fixed32(&mut trailer, crc::mask(checksum));
        self.file.append(&trailer)?;

        self.offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(())
    }
}
