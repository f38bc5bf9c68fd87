//! The engine-wide iterator contract.
//!
//! Memtables, data blocks, and whole tables all expose the same cursor
//! surface so higher layers can compose them (merging iterators, the
//! two-level table iterator) without caring what they walk.
//!
//! An iterator is either *valid* — positioned at an entry whose `key` and
//! `value` may be read — or invalid. Errors encountered while advancing
//! make the iterator invalid and are retained: `status()` keeps returning
//! the first error (it is sticky), and an invalid iterator never becomes
//! valid again except through a seek.

use crate::error::Result;

/// A cursor over ordered `(key, value)` entries.
pub trait Iter {
    /// True iff the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Positions at the first entry, if any.
    fn seek_to_first(&mut self);

    /// Positions at the last entry, if any.
    fn seek_to_last(&mut self);

    /// Positions at the first entry with `key >= target`.
    fn seek(&mut self, target: &[u8]);

    /// Advances to the next entry. Requires `valid()`.
    fn next(&mut self);

    /// Steps back to the previous entry. Requires `valid()`.
    fn prev(&mut self);

    /// The current entry's key. Requires `valid()`.
    fn key(&self) -> &[u8];

    /// The current entry's value. Requires `valid()`.
    fn value(&self) -> &[u8];

    /// First error encountered, if any; sticky once set.
    fn status(&self) -> Result<()>;
}
