//! Internal-key format.
//!
//! The engine never stores user keys directly. Every record is keyed by an
//! *internal key* that binds the user key to the write that produced it:
//!
//! ```text
//! +----------------------+---------------------------------+
//! |      user_key        |  u64le((sequence << 8) | type)  |
//! +----------------------+---------------------------------+
//!  \-- variable length --/ \----------- 8 bytes -----------/
//! ```
//!
//! The sequence number occupies the upper 56 bits of the tag; the value
//! type — `1` for a stored value, `0` for a tombstone — the low 8 bits.
//!
//! Internal keys order by user key ascending, then by tag **descending**,
//! so the newest version of a user key is encountered first during any
//! forward scan. [`InternalKeyComparator`] implements that order on top of
//! a pluggable user comparator.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::Arc;

use crate::codec::{decode_fixed64, put_fixed64, put_varint32, varint_length};
use crate::comparator::Comparator;
use crate::filter::FilterPolicy;

// ------------------------------------------------------------------------------------------------
// Sequence numbers and value types
// ------------------------------------------------------------------------------------------------

/// Monotonic version stamp assigned to every write.
pub type SequenceNumber = u64;

/// Largest representable sequence number (56 bits).
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Discriminates stored values from tombstones in the internal-key tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// Point deletion; the record's value bytes are empty.
    Deletion = 0,
    /// A stored value.
    Value = 1,
}

/// The type used when seeking: since tags sort descending and `Value`
/// compares above `Deletion`, seeking with `(seq, Value)` positions at or
/// before every entry for that `(user_key, seq)`.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl ValueType {
    /// Decodes the low tag byte; `None` for unknown discriminants.
    pub fn from_u8(v: u8) -> Option<ValueType> {
        match v {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }
}

/// Packs a sequence number and value type into the 8-byte trailer tag.
#[inline]
pub fn pack_sequence_and_type(seq: SequenceNumber, t: ValueType) -> u64 {
    debug_assert!(seq <= MAX_SEQUENCE_NUMBER);
    (seq << 8) | t as u64
}

// ------------------------------------------------------------------------------------------------
// Parsed and owned internal keys
// ------------------------------------------------------------------------------------------------

/// A decoded internal key, borrowing its user key from the encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

/// Appends the encoding of `key` to `dst`.
pub fn append_internal_key(dst: &mut Vec<u8>, key: &ParsedInternalKey<'_>) {
    dst.extend_from_slice(key.user_key);
    put_fixed64(dst, pack_sequence_and_type(key.sequence, key.value_type));
}

/// Decodes an internal key. `None` when the input is shorter than the tag
/// or carries an unknown value type.
pub fn parse_internal_key(internal_key: &[u8]) -> Option<ParsedInternalKey<'_>> {
    let n = internal_key.len();
    if n < 8 {
        return None;
    }
    let tag = decode_fixed64(&internal_key[n - 8..]);
    let value_type = ValueType::from_u8((tag & 0xFF) as u8)?;
    Some(ParsedInternalKey {
        user_key: &internal_key[..n - 8],
        sequence: tag >> 8,
        value_type,
    })
}

/// Strips the 8-byte tag, returning the user-key portion.
#[inline]
pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    debug_assert!(internal_key.len() >= 8);
    &internal_key[..internal_key.len() - 8]
}

/// An owned, encoded internal key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, t: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + 8);
        append_internal_key(
            &mut rep,
            &ParsedInternalKey {
                user_key,
                sequence,
                value_type: t,
            },
        );
        InternalKey { rep }
    }

    /// Adopts already-encoded bytes.
    pub fn decode_from(encoded: &[u8]) -> Self {
        InternalKey {
            rep: encoded.to_vec(),
        }
    }

    pub fn encoded(&self) -> &[u8] {
        debug_assert!(!self.rep.is_empty());
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }

    pub fn clear(&mut self) {
        self.rep.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// Internal-key comparator
// ------------------------------------------------------------------------------------------------

/// Orders encoded internal keys: user key ascending per the wrapped user
/// comparator, then tag descending so newer versions sort first.
#[derive(Clone)]
pub struct InternalKeyComparator {
    user_comparator: Arc<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Arc<dyn Comparator>) -> Self {
        InternalKeyComparator { user_comparator }
    }

    pub fn user_comparator(&self) -> &Arc<dyn Comparator> {
        &self.user_comparator
    }
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ord = self
            .user_comparator
            .compare(extract_user_key(a), extract_user_key(b));
        if ord != Ordering::Equal {
            return ord;
        }
        let a_tag = decode_fixed64(&a[a.len() - 8..]);
        let b_tag = decode_fixed64(&b[b.len() - 8..]);
        // Descending: the higher tag sorts first.
        b_tag.cmp(&a_tag)
    }

    fn name(&self) -> &'static str {
        "leveldb.InternalKeyComparator"
    }

    fn find_shortest_separator(&self, start: &mut Vec<u8>, limit: &[u8]) {
        let user_start = extract_user_key(start);
        let user_limit = extract_user_key(limit);
        let mut tmp = user_start.to_vec();
        self.user_comparator
            .find_shortest_separator(&mut tmp, user_limit);
        if tmp.len() < user_start.len()
            && self.user_comparator.compare(user_start, &tmp) == Ordering::Less
        {
            // The user key grew strictly larger; tag it with the maximal
            // tag so the result still sorts before any real entry for it.
            put_fixed64(
                &mut tmp,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert_eq!(self.compare(start, &tmp), Ordering::Less);
            debug_assert_eq!(self.compare(&tmp, limit), Ordering::Less);
            *start = tmp;
        }
    }

    fn find_short_successor(&self, key: &mut Vec<u8>) {
        let user_key = extract_user_key(key);
        let mut tmp = user_key.to_vec();
        self.user_comparator.find_short_successor(&mut tmp);
        if tmp.len() < user_key.len()
            && self.user_comparator.compare(user_key, &tmp) == Ordering::Less
        {
            put_fixed64(
                &mut tmp,
                pack_sequence_and_type(MAX_SEQUENCE_NUMBER, VALUE_TYPE_FOR_SEEK),
            );
            debug_assert_eq!(self.compare(key, &tmp), Ordering::Less);
            *key = tmp;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Internal filter policy
// ------------------------------------------------------------------------------------------------

/// Filter-policy adapter for tables keyed by internal keys.
///
/// Filters are built and probed on the embedded *user* key — the sequence
/// tag would otherwise make every version of a key a distinct filter
/// member and every lookup a guaranteed miss.
pub struct InternalFilterPolicy {
    user_policy: Arc<dyn FilterPolicy>,
}

impl InternalFilterPolicy {
    pub fn new(user_policy: Arc<dyn FilterPolicy>) -> InternalFilterPolicy {
        InternalFilterPolicy { user_policy }
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &'static str {
        self.user_policy.name()
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        let user_keys: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.user_policy.create_filter(&user_keys, dst);
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.user_policy.key_may_match(extract_user_key(key), filter)
    }
}

// ------------------------------------------------------------------------------------------------
// Lookup key
// ------------------------------------------------------------------------------------------------

/// Bytes reserved inline before a lookup key spills to the heap.
const LOOKUP_KEY_INLINE: usize = 200;

enum LookupKeyRep {
    Inline { buf: [u8; LOOKUP_KEY_INLINE], len: usize },
    Heap(Vec<u8>),
}

/// A point-lookup key in the three framings the engine needs.
///
/// Layout of the underlying buffer:
///
/// ```text
/// varint32(klen + 8) ‖ user_key ‖ u64le((sequence << 8) | Value)
/// \------------- memtable_key -------------------------------/
///                      \---------- internal_key -------------/
///                      \- user_key -/
/// ```
///
/// Most keys are short, so the buffer lives on the stack and only spills
/// to the heap past [`LOOKUP_KEY_INLINE`] bytes.
pub struct LookupKey {
    rep: LookupKeyRep,
    /// Offset of the user key (just past the varint prefix).
    kstart: usize,
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        let klen = user_key.len() + 8;
        let prefix = varint_length(klen as u64);
        let needed = prefix + klen;

        let mut scratch = Vec::with_capacity(needed.min(LOOKUP_KEY_INLINE));
        put_varint32(&mut scratch, klen as u32);
        scratch.extend_from_slice(user_key);
        put_fixed64(
            &mut scratch,
            pack_sequence_and_type(sequence, VALUE_TYPE_FOR_SEEK),
        );

        let rep = if needed <= LOOKUP_KEY_INLINE {
            let mut buf = [0u8; LOOKUP_KEY_INLINE];
            buf[..scratch.len()].copy_from_slice(&scratch);
            LookupKeyRep::Inline {
                buf,
                len: scratch.len(),
            }
        } else {
            LookupKeyRep::Heap(scratch)
        };

        LookupKey {
            rep,
            kstart: prefix,
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.rep {
            LookupKeyRep::Inline { buf, len } => &buf[..*len],
            LookupKeyRep::Heap(v) => v,
        }
    }

    /// The full framing used to seek a memtable.
    pub fn memtable_key(&self) -> &[u8] {
        self.bytes()
    }

    /// The internal key used to seek SSTables.
    pub fn internal_key(&self) -> &[u8] {
        &self.bytes()[self.kstart..]
    }

    /// The bare user key.
    pub fn user_key(&self) -> &[u8] {
        let b = self.bytes();
        &b[self.kstart..b.len() - 8]
    }
}
