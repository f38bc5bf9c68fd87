//! # Memtable Module
//!
//! The in-memory staging area for recent writes: an ordered map from
//! internal key to value or tombstone, built on a lock-free-read skiplist
//! whose nodes live in a bump [`arena`].
//!
//! ## Entry encoding
//!
//! Each insert stores one contiguous record in the arena:
//!
//! ```text
//! +--------------------+----------+----------------------+---------------------+-------+
//! | varint32(klen + 8) | user_key | u64le((seq<<8)|type) | varint32(value_len) | value |
//! +--------------------+----------+----------------------+---------------------+-------+
//! ```
//!
//! The skiplist key is the whole record; its comparator decodes the
//! length-prefixed internal key and delegates to the internal-key order
//! (user key ascending, sequence descending).
//!
//! ## Design Invariants
//!
//! - Entries are never overwritten: a newer write of the same user key is
//!   a new entry under a higher sequence number.
//! - Deletes insert tombstones, never remove.
//! - At most one writer mutates the memtable at a time; readers iterate
//!   concurrently without locks and observe a consistent published prefix.
//!
//! ## Lifecycle
//!
//! A memtable is shared as `Arc<MemTable>`: the write path, the
//! immutable-table list, and in-flight iterators each hold a clone. The
//! skiplist and arena are dropped together when the last clone goes away.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub(crate) mod arena;
pub(crate) mod skiplist;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use tracing::trace;

use crate::codec::{
    decode_fixed64, get_length_prefixed_slice, get_varint32, put_fixed64, put_varint32,
};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::iterator::Iter;
use crate::key::{
    InternalKeyComparator, LookupKey, SequenceNumber, ValueType, pack_sequence_and_type,
};

use arena::Arena;
use skiplist::{KeyComparator, SkipList, SkipListIterator};

// ------------------------------------------------------------------------------------------------
// Entry comparator
// ------------------------------------------------------------------------------------------------

/// Orders encoded memtable records by their embedded internal keys.
#[derive(Clone)]
struct EntryComparator {
    icmp: InternalKeyComparator,
}

impl EntryComparator {
    /// Slices the internal key out of a length-prefixed record.
    fn internal_key<'a>(&self, entry: &'a [u8]) -> &'a [u8] {
        match get_varint32(entry) {
            Some((len, prefix)) => &entry[prefix..prefix + len as usize],
            // Unreachable for records produced by `MemTable::add`.
            None => &[],
        }
    }
}

impl KeyComparator for EntryComparator {
    fn compare_key(&self, a: &[u8], b: &[u8]) -> CmpOrdering {
        self.icmp.compare(self.internal_key(a), self.internal_key(b))
    }
}

// ------------------------------------------------------------------------------------------------
// MemTable
// ------------------------------------------------------------------------------------------------

/// Ordered in-memory map `internal_key → value | tombstone`.
pub struct MemTable {
    comparator: InternalKeyComparator,
    arena: Arc<Arena>,
    list: SkipList<EntryComparator>,
}

impl MemTable {
    pub fn new(comparator: InternalKeyComparator) -> MemTable {
        let arena = Arc::new(Arena::new());
        let list = SkipList::new(
            EntryComparator {
                icmp: comparator.clone(),
            },
            Arc::clone(&arena),
        );
        MemTable {
            comparator,
            arena,
            list,
        }
    }

    /// Inserts one record.
    ///
    /// Callers serialize writers externally (the engine's write path holds
    /// the write lock while applying a batch). `value` must be empty for
    /// [`ValueType::Deletion`].
    pub fn add(&self, sequence: SequenceNumber, t: ValueType, user_key: &[u8], value: &[u8]) {
        let internal_key_size = user_key.len() + 8;
        let mut buf = Vec::with_capacity(11 + internal_key_size + value.len());
        put_varint32(&mut buf, internal_key_size as u32);
        buf.extend_from_slice(user_key);
        put_fixed64(&mut buf, pack_sequence_and_type(sequence, t));
        put_varint32(&mut buf, value.len() as u32);
        buf.extend_from_slice(value);

        self.list.insert(&buf);
        trace!(seq = sequence, klen = user_key.len(), "memtable add");
    }

    /// Point lookup.
    ///
    /// - `None` — this memtable knows nothing about the user key.
    /// - `Some(Ok(value))` — the newest visible entry is a stored value.
    /// - `Some(Err(NotFound))` — the newest visible entry is a tombstone.
    pub fn get(&self, key: &LookupKey) -> Option<Result<Vec<u8>>> {
        let mut iter = self.list.iter();
        iter.seek(key.memtable_key());
        if !iter.valid() {
            return None;
        }

        // The seek landed at the first entry >= the lookup key; it only
        // answers for our key if the user-key portions are equal.
        let entry = iter.key();
        let (klen, prefix) = get_varint32(entry)?;
        let klen = klen as usize;
        let ikey = &entry[prefix..prefix + klen];
        if self
            .comparator
            .user_comparator()
            .compare(&ikey[..klen - 8], key.user_key())
            != CmpOrdering::Equal
        {
            return None;
        }

        let tag = decode_fixed64(&ikey[klen - 8..]);
        match ValueType::from_u8((tag & 0xFF) as u8) {
            Some(ValueType::Value) => {
                let rest = &entry[prefix + klen..];
                match get_length_prefixed_slice(rest) {
                    Some((v, _)) => Some(Ok(v.to_vec())),
                    None => Some(Err(Error::corruption("malformed memtable entry"))),
                }
            }
            Some(ValueType::Deletion) => Some(Err(Error::not_found("deleted"))),
            None => Some(Err(Error::corruption("unknown value type in memtable"))),
        }
    }

    /// An iterator yielding internal keys in sorted order.
    pub fn iter(&self) -> MemTableIterator<'_> {
        MemTableIterator {
            iter: self.list.iter(),
            scratch: Vec::new(),
        }
    }

    /// Bytes held by the arena, including skiplist nodes.
    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator
// ------------------------------------------------------------------------------------------------

/// Iterator over memtable entries. `key()` yields the *internal* key;
/// `value()` the raw value bytes (empty for tombstones).
pub struct MemTableIterator<'a> {
    iter: SkipListIterator<'a, EntryComparator>,
    /// Seek targets are internal keys; the skiplist stores memtable keys,
    /// so seeks re-frame the target here.
    scratch: Vec<u8>,
}

impl MemTableIterator<'_> {
    fn current_entry(&self) -> &[u8] {
        debug_assert!(self.iter.valid());
        self.iter.key()
    }
}

impl Iter for MemTableIterator<'_> {
    fn valid(&self) -> bool {
        self.iter.valid()
    }

    fn seek_to_first(&mut self) {
        self.iter.seek_to_first();
    }

    fn seek_to_last(&mut self) {
        self.iter.seek_to_last();
    }

    fn seek(&mut self, target: &[u8]) {
        self.scratch.clear();
        put_varint32(&mut self.scratch, target.len() as u32);
        self.scratch.extend_from_slice(target);
        self.iter.seek(&self.scratch);
    }

    fn next(&mut self) {
        self.iter.next();
    }

    fn prev(&mut self) {
        self.iter.prev();
    }

    fn key(&self) -> &[u8] {
        let entry = self.current_entry();
        match get_varint32(entry) {
            Some((len, prefix)) => &entry[prefix..prefix + len as usize],
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        let entry = self.current_entry();
        match get_varint32(entry) {
            Some((len, prefix)) => {
                let rest = &entry[prefix + len as usize..];
                match get_length_prefixed_slice(rest) {
                    Some((v, _)) => v,
                    None => &[],
                }
            }
            None => &[],
        }
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
