//! Filter blocks: one filter per window of data-block offsets.
//!
//! The table builder cannot know data-block boundaries in advance, so the
//! filter block partitions the file into fixed 2 KiB windows instead:
//! filter `i` covers keys from every data block whose *starting offset*
//! lies in `[i * 2^base_lg, (i+1) * 2^base_lg)`.
//!
//! ```text
//!     +----------+----------+-----+----------+-------------------------+--------------+---------+
//!     | filter 0 | filter 1 | ... | filter n | u32le offset of each    | u32le array  | base_lg |
//!     |          |          |     |          | filter                  | offset       | (1 B)   |
//!     +----------+----------+-----+----------+-------------------------+--------------+---------+
//! ```

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use tracing::warn;

use crate::codec::{decode_fixed32, put_fixed32};
use crate::filter::FilterPolicy;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// log2 of the offset window covered by one filter (2 KiB).
const FILTER_BASE_LG: u8 = 11;
const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

// ------------------------------------------------------------------------------------------------
// FilterBlockBuilder
// ------------------------------------------------------------------------------------------------

/// Accumulates the filter block for a table under construction.
///
/// Call sequence: `(start_block add_key*)* finish`, with `start_block`
/// offsets monotonically increasing.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,

    /// Keys buffered since the last filter flush, flattened.
    keys: Vec<u8>,
    /// Start of each buffered key within `keys`.
    start: Vec<usize>,

    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> FilterBlockBuilder {
        FilterBlockBuilder {
            policy,
            keys: Vec::new(),
            start: Vec::new(),
            result: Vec::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Tells the builder a data block begins at `block_offset`; flushes
    /// buffered keys into filters covering every window up to it.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        debug_assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    /// Buffers a key for the filter of the current window.
    pub fn add_key(&mut self, key: &[u8]) {
        self.start.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    /// Emits the remaining filter, the offset array, and the trailer.
    pub fn finish(&mut self) -> &[u8] {
        if !self.start.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            put_fixed32(&mut self.result, offset);
        }
        put_fixed32(&mut self.result, array_offset);
        self.result.push(FILTER_BASE_LG);
        &self.result
    }

    fn generate_filter(&mut self) {
        let num_keys = self.start.len();
        self.filter_offsets.push(self.result.len() as u32);
        if num_keys == 0 {
            // Empty window: an empty filter.
            return;
        }

        // Re-slice the flattened key buffer.
        self.start.push(self.keys.len());
        let tmp_keys: Vec<&[u8]> = (0..num_keys)
            .map(|i| &self.keys[self.start[i]..self.start[i + 1]])
            .collect();
        self.policy.create_filter(&tmp_keys, &mut self.result);

        self.keys.clear();
        self.start.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// FilterBlockReader
// ------------------------------------------------------------------------------------------------

/// Answers membership queries against a serialized filter block.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
    /// Offset of the filter-offset array.
    offset: usize,
    /// Number of filters.
    num: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    /// Parses `contents`; a malformed block yields a reader that reports
    /// every key as a possible match.
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Vec<u8>) -> FilterBlockReader {
        let mut reader = FilterBlockReader {
            policy,
            data: Vec::new(),
            offset: 0,
            num: 0,
            base_lg: 0,
        };

        let n = contents.len();
        if n < 5 {
            // 1 byte base_lg + 4 bytes array offset, minimum.
            return reader;
        }
        let base_lg = contents[n - 1];
        let array_offset = decode_fixed32(&contents[n - 5..]) as usize;
        if array_offset + 5 > n {
            warn!("filter block framing invalid; filter disabled");
            return reader;
        }

        reader.base_lg = base_lg;
        reader.offset = array_offset;
        reader.num = (n - 5 - array_offset) / 4;
        reader.data = contents;
        reader
    }

    /// True if `key` may be present in the data block starting at
    /// `block_offset`. Framing errors answer true: a false "yes" only
    /// costs a block read.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index < self.num {
            let start = decode_fixed32(&self.data[self.offset + 4 * index..]) as usize;
            let limit = decode_fixed32(&self.data[self.offset + 4 * index + 4..]) as usize;
            if start <= limit && limit <= self.offset {
                let filter = &self.data[start..limit];
                return self.policy.key_may_match(key, filter);
            } else if start == limit {
                // Empty filter: no keys in this window.
                return false;
            }
            // Inconsistent offsets: treat as a match.
        }
        true
    }
}
