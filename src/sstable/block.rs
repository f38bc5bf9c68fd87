//! Prefix-compressed key/value blocks.
//!
//! A block is the unit of SSTable I/O: a run of sorted entries where each
//! key stores only its delta against the previous one, plus a *restart
//! array* for seeking.
//!
//! ```text
//!       + restart point                + restart point (every restart_interval entries)
//!      /                              /
//!     +---------+---------+---------+---------+-------------------------+
//!     | entry 1 | entry 2 |   ...   | entry n | restart array + count   |
//!     +---------+---------+---------+---------+-------------------------+
//!
//!     entry:
//!     +-----------------+---------------------+--------------------+-----------+-------+
//!     | shared (varint) | non_shared (varint) | value_len (varint) | key_delta | value |
//!     +-----------------+---------------------+--------------------+-----------+-------+
//! ```
//!
//! Every `restart_interval` entries the shared length resets to zero and
//! the full key is stored; the restart array lists those entry offsets so
//! a seek can binary-search restarts and only scan linearly within one
//! interval.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use crate::codec::{decode_fixed32, get_varint32, put_fixed32, put_varint32};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterator::Iter;

// ------------------------------------------------------------------------------------------------
// BlockBuilder
// ------------------------------------------------------------------------------------------------

/// Accumulates sorted entries into the block wire format.
///
/// Single-shot: after [`finish`](BlockBuilder::finish) only
/// [`reset`](BlockBuilder::reset) makes the builder reusable.
pub struct BlockBuilder {
    block_restart_interval: usize,
    comparator: Arc<dyn Comparator>,

    buffer: Vec<u8>,
    restarts: Vec<u32>,
    /// Entries since the last restart point.
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(block_restart_interval: usize, comparator: Arc<dyn Comparator>) -> BlockBuilder {
        debug_assert!(block_restart_interval >= 1);
        BlockBuilder {
            block_restart_interval,
            comparator,
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    /// Appends an entry. `key` must sort strictly after every key already
    /// added.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);
        debug_assert!(self.counter <= self.block_restart_interval);
        debug_assert!(
            self.buffer.is_empty()
                || self.comparator.compare(key, &self.last_key) == CmpOrdering::Greater,
            "keys added out of order"
        );

        let mut shared = 0;
        if self.counter < self.block_restart_interval {
            // Shared prefix with the previous key.
            let min_len = self.last_key.len().min(key.len());
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
        } else {
            // Restart point: store the key whole.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        }
        let non_shared = key.len() - shared;

        // Header: three varints; one byte each when all are small.
        if shared < 128 && non_shared < 128 && value.len() < 128 {
            self.buffer.push(shared as u8);
            self.buffer.push(non_shared as u8);
            self.buffer.push(value.len() as u8);
        } else {
            put_varint32(&mut self.buffer, shared as u32);
            put_varint32(&mut self.buffer, non_shared as u32);
            put_varint32(&mut self.buffer, value.len() as u32);
        }

        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        debug_assert_eq!(self.last_key, key);
        self.counter += 1;
    }

    /// Serializes the restart array and returns the finished block bytes.
    pub fn finish(&mut self) -> &[u8] {
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// Bytes the finished block would occupy if closed now.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// Block
// ------------------------------------------------------------------------------------------------

/// An immutable, decoded-on-demand block. Shared via `Arc` between the
/// block cache and any number of live iterators.
pub struct Block {
    data: Vec<u8>,
    /// Offset of the restart array.
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Takes ownership of raw block contents (trailer already stripped).
    pub fn new(data: Vec<u8>) -> Result<Block> {
        if data.len() < 4 {
            return Err(Error::corruption("block too small for restart count"));
        }
        let num_restarts = decode_fixed32(&data[data.len() - 4..]);
        let max_restarts_allowed = (data.len() - 4) / 4;
        if num_restarts as usize > max_restarts_allowed {
            return Err(Error::corruption("bad restart count in block"));
        }
        let restart_offset = data.len() - 4 * (1 + num_restarts as usize);
        Ok(Block {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Size of the underlying byte buffer.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// An iterator sharing ownership of the block. `Arc` clones are
    /// cheap; clone at the call site to keep using the block.
    pub fn iter(self: Arc<Self>, comparator: Arc<dyn Comparator>) -> BlockIterator {
        let current = self.restart_offset;
        let restart_index = self.num_restarts;
        BlockIterator {
            block: self,
            comparator,
            current,
            restart_index,
            key: Vec::new(),
            value_start: 0,
            value_end: 0,
            status: None,
        }
    }

    fn restart_point(&self, index: u32) -> u32 {
        debug_assert!(index < self.num_restarts);
        decode_fixed32(&self.data[self.restart_offset + 4 * index as usize..])
    }
}

/// Decodes one entry header at `data[p..limit]`.
///
/// Returns `(shared, non_shared, value_len, header_len)` or `None` on
/// malformed input.
fn decode_entry(data: &[u8], p: usize, limit: usize) -> Option<(u32, u32, u32, usize)> {
    if limit < p + 3 {
        return None;
    }
    let fast = &data[p..];
    let (shared, non_shared, value_len) = (fast[0], fast[1], fast[2]);
    if shared | non_shared | value_len < 128 {
        // Fast path: each length fits one byte.
        return Some((
            u32::from(shared),
            u32::from(non_shared),
            u32::from(value_len),
            3,
        ));
    }

    let slice = &data[p..limit];
    let (shared, n0) = get_varint32(slice)?;
    let (non_shared, n1) = get_varint32(&slice[n0..])?;
    let (value_len, n2) = get_varint32(&slice[n0 + n1..])?;
    Some((shared, non_shared, value_len, n0 + n1 + n2))
}

// ------------------------------------------------------------------------------------------------
// BlockIterator
// ------------------------------------------------------------------------------------------------

/// Bidirectional cursor over one block.
pub struct BlockIterator {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,

    /// Offset of the current entry; `== restart_offset` when invalid.
    current: usize,
    /// Restart block containing `current`.
    restart_index: u32,

    key: Vec<u8>,
    value_start: usize,
    value_end: usize,

    status: Option<Error>,
}

impl BlockIterator {
    /// Offset just past the current entry.
    fn next_entry_offset(&self) -> usize {
        self.value_end
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        // `current` is tracked implicitly: parse_next_key picks up at
        // value_end, which we park at the restart offset.
        let offset = self.block.restart_point(index) as usize;
        self.value_start = offset;
        self.value_end = offset;
    }

    fn corruption_error(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
        self.key.clear();
        self.value_start = 0;
        self.value_end = 0;
        if self.status.is_none() {
            self.status = Some(Error::corruption("bad entry in block"));
        }
    }

    /// Decodes the entry at `next_entry_offset`, reconstructing its key
    /// from the shared prefix. Returns false at the end of the block.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_entry_offset();
        if self.current >= self.block.restart_offset {
            // No more entries; mark invalid.
            self.current = self.block.restart_offset;
            self.restart_index = self.block.num_restarts;
            return false;
        }

        let Some((shared, non_shared, value_len, header_len)) =
            decode_entry(&self.block.data, self.current, self.block.restart_offset)
        else {
            self.corruption_error();
            return false;
        };

        let delta_start = self.current + header_len;
        let entry_end = delta_start + non_shared as usize + value_len as usize;
        if entry_end > self.block.restart_offset || self.key.len() < shared as usize {
            self.corruption_error();
            return false;
        }

        self.key.truncate(shared as usize);
        self.key
            .extend_from_slice(&self.block.data[delta_start..delta_start + non_shared as usize]);
        self.value_start = delta_start + non_shared as usize;
        self.value_end = entry_end;

        while self.restart_index + 1 < self.block.num_restarts
            && (self.block.restart_point(self.restart_index + 1) as usize) < self.current
        {
            self.restart_index += 1;
        }
        true
    }
}

impl Iter for BlockIterator {
    fn valid(&self) -> bool {
        self.status.is_none() && self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.corruption_error();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.corruption_error();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_entry_offset() < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.corruption_error();
            return;
        }

        // Binary search over restarts for the last restart whose key is
        // strictly less than the target.
        let mut left: u32 = 0;
        let mut right: u32 = self.block.num_restarts - 1;
        let mut current_key_compare = CmpOrdering::Equal;

        if self.valid() {
            // A positioned iterator narrows the search range for free.
            current_key_compare = self.comparator.compare(&self.key, target);
            match current_key_compare {
                CmpOrdering::Less => left = self.restart_index,
                CmpOrdering::Greater => right = self.restart_index,
                CmpOrdering::Equal => return,
            }
        }

        while left < right {
            let mid = (left + right + 1) / 2;
            let region_offset = self.block.restart_point(mid) as usize;
            let Some((shared, non_shared, _, header_len)) =
                decode_entry(&self.block.data, region_offset, self.block.restart_offset)
            else {
                self.corruption_error();
                return;
            };
            if shared != 0 {
                // Restart keys never share a prefix.
                self.corruption_error();
                return;
            }
            let key_start = region_offset + header_len;
            let mid_key = &self.block.data[key_start..key_start + non_shared as usize];
            if self.comparator.compare(mid_key, target) == CmpOrdering::Less {
                // Key at mid is smaller; everything before mid is too.
                left = mid;
            } else {
                // Key at mid is >= target; it cannot be the answer.
                right = mid - 1;
            }
        }

        // We can skip re-seeking iff we were already inside the winning
        // restart block and positioned at or before the target.
        let skip_seek = left == self.restart_index && current_key_compare == CmpOrdering::Less;
        if !skip_seek {
            self.seek_to_restart_point(left);
        }

        // Linear scan to the first key >= target.
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != CmpOrdering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        self.parse_next_key();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());

        // Step back to the last restart before the current entry...
        let original = self.current;
        while self.block.restart_point(self.restart_index) as usize >= original {
            if self.restart_index == 0 {
                // No entries before the first one.
                self.current = self.block.restart_offset;
                self.restart_index = self.block.num_restarts;
                return;
            }
            self.restart_index -= 1;
        }

        // ...then walk forward until just before where we were.
        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.next_entry_offset() < original {}
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.block.data[self.value_start..self.value_end]
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}
