//! # Write Batch Module
//!
//! The unit of atomic write: an ordered list of puts and deletes that is
//! logged as one WAL record and applied to the memtable as consecutive
//! sequence numbers.
//!
//! ## Wire format
//!
//! The batch *is* its serialization; building one is appending bytes:
//!
//! ```text
//! +----------------+---------------+----------------------------------+
//! | sequence u64le | count u32le   | record*                          |
//! +----------------+---------------+----------------------------------+
//!
//! record :=
//!     0x01 ‖ varint32(klen) ‖ key ‖ varint32(vlen) ‖ value     (put)
//!     0x00 ‖ varint32(klen) ‖ key                               (delete)
//! ```
//!
//! The 8-byte sequence is the number assigned to the first record; record
//! `i` commits at `sequence + i`. The tag byte reuses the internal-key
//! value-type encoding.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use crate::codec::{
    decode_fixed32, decode_fixed64, get_length_prefixed_slice, put_fixed32, put_fixed64,
    put_length_prefixed_slice,
};
use crate::error::{Error, Result};
use crate::key::{SequenceNumber, ValueType};
use crate::memtable::MemTable;

/// sequence (8) + count (4).
const BATCH_HEADER_SIZE: usize = 12;

// ------------------------------------------------------------------------------------------------
// Handler trait
// ------------------------------------------------------------------------------------------------

/// Receives the operations of a batch, in insertion order.
pub trait BatchHandler {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

// ------------------------------------------------------------------------------------------------
// WriteBatch
// ------------------------------------------------------------------------------------------------

/// An atomic group of updates.
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        WriteBatch::new()
    }
}

impl WriteBatch {
    pub fn new() -> WriteBatch {
        WriteBatch {
            rep: vec![0; BATCH_HEADER_SIZE],
        }
    }

    /// Queues an insert/overwrite of `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Value as u8);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    /// Queues a deletion of `key`.
    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(ValueType::Deletion as u8);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Empties the batch for reuse.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Serialized size in bytes.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    /// Appends all of `other`'s operations after this batch's.
    pub fn append(&mut self, other: &WriteBatch) {
        self.set_count(self.count() + other.count());
        self.rep.extend_from_slice(&other.rep[BATCH_HEADER_SIZE..]);
    }

    /// Walks the operations in order, dispatching to `handler`.
    ///
    /// Fails with `Corruption` when the framing is malformed or the
    /// record count disagrees with the header.
    pub fn iterate(&self, handler: &mut dyn BatchHandler) -> Result<()> {
        if self.rep.len() < BATCH_HEADER_SIZE {
            return Err(Error::corruption("malformed WriteBatch (too small)"));
        }

        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        let mut found = 0u32;
        while !input.is_empty() {
            let tag = input[0];
            input = &input[1..];
            match ValueType::from_u8(tag) {
                Some(ValueType::Value) => {
                    let (key, n) = get_length_prefixed_slice(input)
                        .ok_or_else(|| Error::corruption("bad WriteBatch Put"))?;
                    let (value, m) = get_length_prefixed_slice(&input[n..])
                        .ok_or_else(|| Error::corruption("bad WriteBatch Put"))?;
                    handler.put(key, value);
                    input = &input[n + m..];
                }
                Some(ValueType::Deletion) => {
                    let (key, n) = get_length_prefixed_slice(input)
                        .ok_or_else(|| Error::corruption("bad WriteBatch Delete"))?;
                    handler.delete(key);
                    input = &input[n..];
                }
                None => return Err(Error::corruption("unknown WriteBatch tag")),
            }
            found += 1;
        }

        if found != self.count() {
            return Err(Error::corruption("WriteBatch has wrong count"));
        }
        Ok(())
    }

    /// Replays the batch into `mem`, assigning `sequence() + i` to the
    /// i-th record.
    pub fn insert_into(&self, mem: &MemTable) -> Result<()> {
        let mut inserter = MemTableInserter {
            sequence: self.sequence(),
            mem,
        };
        self.iterate(&mut inserter)
    }

    /// Number of operations queued.
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..])
    }

    /// The sequence number of the first record.
    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep)
    }

    /// Stamps the base sequence number (done by the write path when the
    /// batch commits).
    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        let mut header = Vec::with_capacity(8);
        put_fixed64(&mut header, sequence);
        self.rep[..8].copy_from_slice(&header);
    }

    /// The full serialized representation (header included).
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Adopts a serialized batch, e.g. one recovered from the WAL.
    pub fn set_contents(&mut self, contents: &[u8]) -> Result<()> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(Error::corruption("malformed WriteBatch (too small)"));
        }
        self.rep.clear();
        self.rep.extend_from_slice(contents);
        Ok(())
    }

    /// Bytes the operations occupy, excluding the header.
    pub fn byte_size(&self) -> usize {
        self.rep.len() - BATCH_HEADER_SIZE
    }

    fn set_count(&mut self, count: u32) {
        let mut buf = Vec::with_capacity(4);
        put_fixed32(&mut buf, count);
        self.rep[8..BATCH_HEADER_SIZE].copy_from_slice(&buf);
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable insertion
// ------------------------------------------------------------------------------------------------

struct MemTableInserter<'a> {
    sequence: SequenceNumber,
    mem: &'a MemTable,
}

impl BatchHandler for MemTableInserter<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.mem.add(self.sequence, ValueType::Value, key, value);
        self.sequence += 1;
    }

    fn delete(&mut self, key: &[u8]) {
        self.mem.add(self.sequence, ValueType::Deletion, key, b"");
        self.sequence += 1;
    }
}
