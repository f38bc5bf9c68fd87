//! Pluggable point-lookup filters.
//!
//! A [`FilterPolicy`] turns a set of keys into a compact probabilistic
//! membership structure and later answers "could this key be in that
//! set?". False positives cost one wasted block read; false negatives are
//! forbidden.
//!
//! [`BloomFilterPolicy`] is the built-in instantiation, backed by the
//! `bloomfilter` crate. The serialized bloom (bitmap plus its hashing
//! parameters) is the filter payload, so a reader reconstructs the exact
//! filter the writer built.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use bloomfilter::Bloom;
use tracing::warn;

// ------------------------------------------------------------------------------------------------
// FilterPolicy trait
// ------------------------------------------------------------------------------------------------

/// Builds and queries per-block-range key filters.
pub trait FilterPolicy: Send + Sync {
    /// Identifies the filter encoding. Persisted in the table's metaindex
    /// as `filter.<name>`; a reader that does not recognize the name
    /// ignores the filter.
    fn name(&self) -> &'static str;

    /// Appends a filter summarizing `keys` to `dst`.
    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>);

    /// True if `key` may be in the set `filter` was built from. Must
    /// return true for every key that was in the set; should usually
    /// return false otherwise.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

// ------------------------------------------------------------------------------------------------
// Bloom filter policy
// ------------------------------------------------------------------------------------------------

/// Bloom-filter [`FilterPolicy`].
pub struct BloomFilterPolicy {
    false_positive_rate: f64,
}

impl BloomFilterPolicy {
    /// A policy targeting the given false-positive rate (e.g. `0.01`).
    pub fn new(false_positive_rate: f64) -> BloomFilterPolicy {
        debug_assert!(false_positive_rate > 0.0 && false_positive_rate < 1.0);
        BloomFilterPolicy {
            false_positive_rate,
        }
    }
}

impl Default for BloomFilterPolicy {
    /// Roughly ten bits per key.
    fn default() -> Self {
        BloomFilterPolicy::new(0.01)
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "stratumdb.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        if keys.is_empty() {
            // An empty filter matches nothing; emit no bytes.
            return;
        }
        let mut bloom: Bloom<[u8]> = match Bloom::new_for_fp_rate(keys.len(), self.false_positive_rate)
        {
            Ok(bloom) => bloom,
            Err(e) => {
                // Filterless tables are slower, never wrong.
                warn!(keys = keys.len(), error = %e, "bloom construction failed");
                return;
            }
        };
        for key in keys {
            bloom.set(key);
        }
        dst.extend_from_slice(bloom.as_slice());
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.is_empty() {
            // Built from zero keys: nothing can match.
            return false;
        }
        match Bloom::from_slice(filter) {
            Ok(bloom) => bloom.check(key),
            // Unreadable filter: err toward reading the block.
            Err(_) => true,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
