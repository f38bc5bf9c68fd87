//! # Sharded LRU Cache Module
//!
//! A capacity-bounded cache with reference-counted entries, used for
//! decoded data blocks (and, above the core, open table handles). The key
//! space is split across 16 shards by the top 4 bits of a key hash; each
//! shard is an independent LRU behind its own mutex, so concurrent readers
//! rarely contend.
//!
//! ## Shard structure
//!
//! Every live entry is in the shard's hash table and on exactly one of
//! two circular doubly-linked lists:
//!
//! - `in_use` — entries some client currently holds a handle to
//!   (`refs >= 2`: the cache's own reference plus at least one handle).
//!   Order is immaterial.
//! - `lru` — entries only the cache references (`refs == 1`), ordered
//!   oldest to newest. Eviction pops from the old end.
//!
//! An entry leaves the cache through *finish-erase* (eviction, `erase`,
//! replacement by a newer insert, `prune`): it is unlinked, uncharged and
//! loses the cache's reference — but it is only destroyed, and its deleter
//! run, once the last outstanding handle is released. A handle therefore
//! pins an entry's memory even after it is no longer reachable by lookup.
//!
//! ## Invariants
//!
//! - `refs == 0` entries are unreachable and freed immediately.
//! - on `lru`: `refs == 1 && in_cache`; on `in_use`: `refs >= 2 && in_cache`.
//! - the sum of charges over both lists equals the shard's `usage`.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::util::hash::hash;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

const NUM_SHARD_BITS: u32 = 4;
const NUM_SHARDS: usize = 1 << NUM_SHARD_BITS;

// ------------------------------------------------------------------------------------------------
// Entry
// ------------------------------------------------------------------------------------------------

/// Destructor callback invoked when an entry's last reference drops.
pub type Deleter<T> = Box<dyn FnMut(&[u8], &mut T) + Send>;

struct Entry<T> {
    key: Vec<u8>,
    hash: u32,
    value: T,
    charge: usize,
    deleter: Option<Deleter<T>>,

    /// Cache reference (1 while tracked) + outstanding handles.
    refs: u32,
    /// Whether the shard still tracks this entry.
    in_cache: bool,

    prev: *mut Entry<T>,
    next: *mut Entry<T>,
}

/// A reference to a cache entry, pinning it until released.
///
/// Obtain from [`LruCache::insert`]/[`LruCache::lookup`]; give back with
/// [`LruCache::release`]. The borrow of the cache keeps the cache alive
/// while any handle is outstanding.
pub struct CacheHandle<'c, T> {
    entry: NonNull<Entry<T>>,
    _cache: PhantomData<&'c LruCache<T>>,
}

// SAFETY: a handle is an opaque pinned reference; all mutation of the
// entry happens inside the owning shard's mutex.
unsafe impl<T: Send> Send for CacheHandle<'_, T> {}
unsafe impl<T: Send + Sync> Sync for CacheHandle<'_, T> {}

// ------------------------------------------------------------------------------------------------
// Shard
// ------------------------------------------------------------------------------------------------

struct Shard<T> {
    capacity: usize,
    usage: usize,

    /// Dummy heads of the two circular lists.
    lru: *mut Entry<T>,
    in_use: *mut Entry<T>,

    table: HashMap<Vec<u8>, NonNull<Entry<T>>>,
}

// SAFETY: every raw pointer in a shard is only dereferenced while the
// shard's mutex is held.
unsafe impl<T: Send> Send for Shard<T> {}

impl<T> Shard<T> {
    fn new(capacity: usize) -> Shard<T> {
        // Dummy heads start as one-element cycles.
        let lru = Shard::new_dummy();
        let in_use = Shard::new_dummy();
        Shard {
            capacity,
            usage: 0,
            lru,
            in_use,
            table: HashMap::new(),
        }
    }

    fn new_dummy() -> *mut Entry<T> {
        // A value of arbitrary T is not constructible, so dummy heads are
        // allocated uninitialized; only their `prev`/`next` fields are
        // ever written or read.
        let layout = std::alloc::Layout::new::<Entry<T>>();
        // SAFETY: allocation is checked; only prev/next are initialized
        // and only those fields are accessed on dummies.
        unsafe {
            let raw = std::alloc::alloc(layout) as *mut Entry<T>;
            if raw.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            (&raw mut (*raw).prev).write(raw);
            (&raw mut (*raw).next).write(raw);
            raw
        }
    }

    /// Unlinks `e` from whichever list holds it.
    unsafe fn list_remove(e: *mut Entry<T>) {
        unsafe {
            (*(*e).next).prev = (*e).prev;
            (*(*e).prev).next = (*e).next;
        }
    }

    /// Appends `e` before `list` — the newest position of a cycle.
    unsafe fn list_append(list: *mut Entry<T>, e: *mut Entry<T>) {
        unsafe {
            (*e).next = list;
            (*e).prev = (*list).prev;
            (*(*e).prev).next = e;
            (*(*e).next).prev = e;
        }
    }

    unsafe fn ref_entry(&mut self, e: *mut Entry<T>) {
        unsafe {
            if (*e).refs == 1 && (*e).in_cache {
                // Gaining its first handle: promote from lru to in_use.
                Shard::list_remove(e);
                Shard::list_append(self.in_use, e);
            }
            (*e).refs += 1;
        }
    }

    unsafe fn unref_entry(&mut self, e: *mut Entry<T>) {
        unsafe {
            debug_assert!((*e).refs > 0, "cache handle released twice");
            (*e).refs -= 1;
            if (*e).refs == 0 {
                debug_assert!(!(*e).in_cache);
                // Reconstruct the box and run the deleter.
                let mut entry = Box::from_raw(e);
                if let Some(mut deleter) = entry.deleter.take() {
                    deleter(&entry.key, &mut entry.value);
                }
            } else if (*e).in_cache && (*e).refs == 1 {
                // Last handle released: demote to the eviction list.
                Shard::list_remove(e);
                Shard::list_append(self.lru, e);
            }
        }
    }

    /// Detaches `e` from the shard (list + charge + cache ref). The entry
    /// survives while handles reference it.
    unsafe fn finish_erase(&mut self, e: *mut Entry<T>) {
        unsafe {
            debug_assert!((*e).in_cache);
            Shard::list_remove(e);
            (*e).in_cache = false;
            self.usage -= (*e).charge;
            self.unref_entry(e);
        }
    }

    fn insert(
        &mut self,
        key: &[u8],
        key_hash: u32,
        value: T,
        charge: usize,
        deleter: Option<Deleter<T>>,
    ) -> NonNull<Entry<T>> {
        let entry = Box::into_raw(Box::new(Entry {
            key: key.to_vec(),
            hash: key_hash,
            value,
            charge,
            deleter,
            refs: 1, // the returned handle
            in_cache: false,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }));

        // SAFETY: `entry` is freshly allocated; list/table pointers are
        // manipulated under the shard lock held by the caller.
        unsafe {
            if self.capacity > 0 {
                (*entry).refs += 1; // the cache's reference
                (*entry).in_cache = true;
                Shard::list_append(self.in_use, entry);
                self.usage += charge;
                if let Some(old) = self.table.insert(key.to_vec(), NonNull::new_unchecked(entry)) {
                    self.finish_erase(old.as_ptr());
                }
            }
            // capacity == 0 turns caching off; the caller still gets a
            // working handle to an untracked entry.

            while self.usage > self.capacity && (*self.lru).next != self.lru {
                let old = (*self.lru).next;
                debug_assert_eq!((*old).refs, 1);
                let removed = self.table.remove(&(*old).key);
                debug_assert!(removed.is_some());
                self.finish_erase(old);
            }

            NonNull::new_unchecked(entry)
        }
    }

    fn lookup(&mut self, key: &[u8]) -> Option<NonNull<Entry<T>>> {
        let entry = self.table.get(key).copied();
        if let Some(e) = entry {
            // SAFETY: table entries are live and the lock is held.
            unsafe { self.ref_entry(e.as_ptr()) };
        }
        entry
    }

    fn erase(&mut self, key: &[u8]) {
        if let Some(e) = self.table.remove(key) {
            // SAFETY: the entry was tracked; lock is held.
            unsafe { self.finish_erase(e.as_ptr()) };
        }
    }

    fn prune(&mut self) {
        // SAFETY: all pointers on `lru` are live tracked entries.
        unsafe {
            while (*self.lru).next != self.lru {
                let e = (*self.lru).next;
                debug_assert_eq!((*e).refs, 1);
                self.table.remove(&(*e).key);
                self.finish_erase(e);
            }
        }
    }
}

impl<T> Drop for Shard<T> {
    fn drop(&mut self) {
        // All handles must be released before the cache goes away.
        // SAFETY: drop has exclusive access.
        unsafe {
            debug_assert!(
                (*self.in_use).next == self.in_use,
                "cache dropped with outstanding handles"
            );
            let mut e = (*self.lru).next;
            while e != self.lru {
                let next = (*e).next;
                debug_assert_eq!((*e).refs, 1);
                (*e).in_cache = false;
                self.unref_entry(e);
                e = next;
            }
            // Free the dummy heads without running Entry's destructor;
            // their payload fields were never initialized.
            let layout = std::alloc::Layout::new::<Entry<T>>();
            std::alloc::dealloc(self.lru as *mut u8, layout);
            std::alloc::dealloc(self.in_use as *mut u8, layout);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// LruCache
// ------------------------------------------------------------------------------------------------

/// Sharded LRU cache. See the module docs for semantics.
pub struct LruCache<T> {
    shards: Vec<Mutex<Shard<T>>>,
    last_id: AtomicU64,
}

impl<T> LruCache<T> {
    /// A cache bounded by `capacity` total charge, split evenly across
    /// shards.
    pub fn new(capacity: usize) -> LruCache<T> {
        let per_shard = capacity.div_ceil(NUM_SHARDS);
        let shards = (0..NUM_SHARDS)
            .map(|_| Mutex::new(Shard::new(per_shard)))
            .collect();
        LruCache {
            shards,
            last_id: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key_hash: u32) -> &Mutex<Shard<T>> {
        &self.shards[(key_hash >> (32 - NUM_SHARD_BITS)) as usize]
    }

    fn hash_key(key: &[u8]) -> u32 {
        hash(key, 0)
    }

    /// Inserts a value with the given charge, returning a handle to it.
    /// Replaces (and finish-erases) any previous entry under `key`.
    ///
    /// The deleter runs when the entry's last reference disappears.
    pub fn insert(
        &self,
        key: &[u8],
        value: T,
        charge: usize,
        deleter: Option<Deleter<T>>,
    ) -> CacheHandle<'_, T> {
        let key_hash = Self::hash_key(key);
        let mut shard = self.shard_for(key_hash).lock().unwrap();
        let entry = shard.insert(key, key_hash, value, charge, deleter);
        CacheHandle {
            entry,
            _cache: PhantomData,
        }
    }

    /// Looks up `key`, pinning and returning its entry on a hit.
    pub fn lookup(&self, key: &[u8]) -> Option<CacheHandle<'_, T>> {
        let key_hash = Self::hash_key(key);
        let mut shard = self.shard_for(key_hash).lock().unwrap();
        let found = shard.lookup(key);
        trace!(hit = found.is_some(), "cache lookup");
        found.map(|entry| CacheHandle {
            entry,
            _cache: PhantomData,
        })
    }

    /// The value behind a handle.
    pub fn value<'h>(&self, handle: &'h CacheHandle<'_, T>) -> &'h T {
        // SAFETY: the handle pins the entry; `value` is immutable while
        // any handle exists.
        unsafe { &handle.entry.as_ref().value }
    }

    /// Releases a handle. The entry is destroyed once untracked and
    /// unreferenced.
    pub fn release(&self, handle: CacheHandle<'_, T>) {
        // SAFETY: the handle proves the entry is live; the shard lock
        // serializes the refcount update.
        unsafe {
            let key_hash = handle.entry.as_ref().hash;
            let mut shard = self.shard_for(key_hash).lock().unwrap();
            shard.unref_entry(handle.entry.as_ptr());
        }
    }

    /// Drops the entry under `key` from the cache. Outstanding handles
    /// keep the entry alive; no new lookups will find it.
    pub fn erase(&self, key: &[u8]) {
        let key_hash = Self::hash_key(key);
        let mut shard = self.shard_for(key_hash).lock().unwrap();
        shard.erase(key);
    }

    /// Evicts everything not currently pinned.
    pub fn prune(&self) {
        for shard in &self.shards {
            shard.lock().unwrap().prune();
        }
    }

    /// Sum of charges of all tracked entries.
    pub fn total_charge(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap().usage)
            .sum()
    }

    /// A process-unique id. Callers sharing one cache prefix their keys
    /// with an id so key spaces cannot collide.
    pub fn new_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// SAFETY: all interior mutability is behind per-shard mutexes; `Sync`
// additionally requires `T: Sync` because `value()` hands out `&T` to any
// thread holding a handle.
unsafe impl<T: Send> Send for LruCache<T> {}
unsafe impl<T: Send + Sync> Sync for LruCache<T> {}
