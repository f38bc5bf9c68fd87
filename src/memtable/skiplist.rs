//! Concurrent skiplist over arena-allocated nodes.
//!
//! The list supports one writer and any number of readers with no locking.
//! Each node carries an array of forward pointers, one per level; the
//! writer links a new node bottom-up with release stores, readers chase
//! pointers with acquire loads, so a reader either sees a fully-linked
//! node or does not see it at all.
//!
//! # Layout
//!
//! Nodes live in the arena with their next-pointer array allocated inline
//! after the struct header:
//!
//! ```text
//! +---------+---------+--------+----------+-----+------------------+
//! | key ptr | key len | height | next[0]  | ... | next[height - 1] |
//! +---------+---------+--------+----------+-----+------------------+
//! ```
//!
//! Heights are drawn from a geometric distribution with p = 1/4, capped at
//! 12 levels. Keys are copied into the arena on insert, so node memory and
//! key memory share the arena's lifetime.
//!
//! # Contract
//!
//! - At most one thread calls [`SkipList::insert`] at a time; the owning
//!   memtable's write path enforces this.
//! - Keys must be unique under the list's comparator; duplicates trip a
//!   debug assertion.
//! - Nodes are never removed. The whole list is reclaimed when the arena
//!   drops.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::arena::Arena;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Maximum node height.
const MAX_HEIGHT: usize = 12;

/// Inverse probability of growing a node by one level.
const BRANCHING: u32 = 4;

// ------------------------------------------------------------------------------------------------
// Key comparator
// ------------------------------------------------------------------------------------------------

/// Total order over the raw keys stored in a skiplist.
pub(crate) trait KeyComparator: Send + Sync {
    fn compare_key(&self, a: &[u8], b: &[u8]) -> CmpOrdering;
}

// ------------------------------------------------------------------------------------------------
// Node
// ------------------------------------------------------------------------------------------------

#[repr(C)]
struct Node {
    key_ptr: *const u8,
    key_len: usize,
    height: usize,
    /// First element of the trailing next-pointer array; the remaining
    /// `height - 1` slots are allocated directly after this field.
    next: [AtomicPtr<Node>; 1],
}

impl Node {
    /// Allocates a node of `height` levels in `arena`, copying `key` in.
    ///
    /// All next pointers start null.
    fn alloc(arena: &Arena, key: &[u8], height: usize) -> *mut Node {
        debug_assert!((1..=MAX_HEIGHT).contains(&height));
        let key_ptr = arena.copy_bytes(key);

        let size = size_of::<Node>() + (height - 1) * size_of::<AtomicPtr<Node>>();
        let node = arena.allocate_aligned(size) as *mut Node;
        // SAFETY: `node` points at `size` fresh, properly aligned bytes.
        unsafe {
            (&raw mut (*node).key_ptr).write(key_ptr);
            (&raw mut (*node).key_len).write(key.len());
            (&raw mut (*node).height).write(height);
            let slots = (&raw mut (*node).next) as *mut AtomicPtr<Node>;
            for i in 0..height {
                slots.add(i).write(AtomicPtr::new(ptr::null_mut()));
            }
        }
        node
    }

    fn key(&self) -> &[u8] {
        // SAFETY: `key_ptr` addresses `key_len` arena bytes that outlive
        // every node.
        unsafe { std::slice::from_raw_parts(self.key_ptr, self.key_len) }
    }

    fn next_slot(&self, level: usize) -> &AtomicPtr<Node> {
        debug_assert!(level < self.height);
        // SAFETY: `level < height` slots were initialized in `alloc`.
        unsafe { &*self.next.as_ptr().add(level) }
    }

    /// Acquire-load of the successor at `level`; pairs with `set_next`.
    fn next(&self, level: usize) -> *mut Node {
        self.next_slot(level).load(Ordering::Acquire)
    }

    /// Release-store publishing a successor at `level`.
    fn set_next(&self, level: usize, node: *mut Node) {
        self.next_slot(level).store(node, Ordering::Release);
    }

    /// Relaxed variants for locations no reader can observe yet.
    fn no_barrier_next(&self, level: usize) -> *mut Node {
        self.next_slot(level).load(Ordering::Relaxed)
    }

    fn no_barrier_set_next(&self, level: usize, node: *mut Node) {
        self.next_slot(level).store(node, Ordering::Relaxed);
    }
}

// ------------------------------------------------------------------------------------------------
// SkipList
// ------------------------------------------------------------------------------------------------

pub(crate) struct SkipList<C: KeyComparator> {
    comparator: C,
    arena: Arc<Arena>,
    head: *mut Node,
    /// Height of the tallest node; only grows.
    max_height: AtomicUsize,
    /// Height generator; touched only by the single writer.
    rng: RefCell<SmallRng>,
}

// SAFETY: shared access is governed by the module contract — one writer,
// lock-free readers over acquire-loaded pointers. The raw head pointer and
// the RefCell'd RNG are only mutated on the writer's thread.
unsafe impl<C: KeyComparator> Send for SkipList<C> {}
unsafe impl<C: KeyComparator> Sync for SkipList<C> {}

impl<C: KeyComparator> SkipList<C> {
    pub(crate) fn new(comparator: C, arena: Arc<Arena>) -> SkipList<C> {
        let head = Node::alloc(&arena, &[], MAX_HEIGHT);
        SkipList {
            comparator,
            arena,
            head,
            max_height: AtomicUsize::new(1),
            rng: RefCell::new(SmallRng::seed_from_u64(0xDEAD_BEEF)),
        }
    }

    /// Inserts `key`, copying it into the arena.
    ///
    /// Requires external single-writer discipline, and that no equal key is
    /// already present.
    pub(crate) fn insert(&self, key: &[u8]) {
        let mut prev = [ptr::null_mut::<Node>(); MAX_HEIGHT];
        let x = self.find_greater_or_equal(key, Some(&mut prev));

        debug_assert!(
            x.is_null()
                || self
                    .comparator
                    // SAFETY: non-null nodes returned by the search are live.
                    .compare_key(unsafe { (*x).key() }, key)
                    != CmpOrdering::Equal,
            "duplicate key inserted into skiplist"
        );

        let height = self.random_height();
        let list_height = self.max_height();
        if height > list_height {
            for p in prev.iter_mut().take(height).skip(list_height) {
                *p = self.head;
            }
            // A relaxed store is enough: a reader seeing the new height
            // finds null next pointers from head and just descends.
            self.max_height.store(height, Ordering::Relaxed);
        }

        let x = Node::alloc(&self.arena, key, height);
        for level in 0..height {
            // SAFETY: `x` is unpublished, so its own links need no
            // barrier; the store into `prev` publishes it level by level.
            unsafe {
                (*x).no_barrier_set_next(level, (*prev[level]).no_barrier_next(level));
                (*prev[level]).set_next(level, x);
            }
        }
    }

    /// True iff an entry equal to `key` is in the list.
    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        let x = self.find_greater_or_equal(key, None);
        // SAFETY: non-null nodes are live for the arena's lifetime.
        !x.is_null() && self.comparator.compare_key(unsafe { (*x).key() }, key) == CmpOrdering::Equal
    }

    pub(crate) fn iter(&self) -> SkipListIterator<'_, C> {
        SkipListIterator {
            list: self,
            node: ptr::null(),
        }
    }

    fn max_height(&self) -> usize {
        self.max_height.load(Ordering::Relaxed)
    }

    fn random_height(&self) -> usize {
        let mut rng = self.rng.borrow_mut();
        let mut height = 1;
        while height < MAX_HEIGHT && rng.random_ratio(1, BRANCHING) {
            height += 1;
        }
        debug_assert!((1..=MAX_HEIGHT).contains(&height));
        height
    }

    /// True iff `key` sorts strictly after the contents of `node`.
    fn key_is_after_node(&self, key: &[u8], node: *mut Node) -> bool {
        // SAFETY: non-null nodes are live for the arena's lifetime.
        !node.is_null()
            && self.comparator.compare_key(unsafe { (*node).key() }, key) == CmpOrdering::Less
    }

    /// Returns the first node `>= key`, or null. When `prev` is supplied it
    /// is filled with the predecessor at every level, ready for linking.
    fn find_greater_or_equal(
        &self,
        key: &[u8],
        mut prev: Option<&mut [*mut Node; MAX_HEIGHT]>,
    ) -> *mut Node {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: `x` starts at head and only advances through live nodes.
            let next = unsafe { (*x).next(level) };
            if self.key_is_after_node(key, next) {
                x = next;
            } else {
                if let Some(prev) = prev.as_mut() {
                    prev[level] = x;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    /// Returns the last node `< key`, or head when none is.
    fn find_less_than(&self, key: &[u8]) -> *mut Node {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: as in `find_greater_or_equal`.
            let next = unsafe { (*x).next(level) };
            let keep_going = !next.is_null()
                && self.comparator.compare_key(unsafe { (*next).key() }, key) == CmpOrdering::Less;
            if keep_going {
                x = next;
            } else if level == 0 {
                return x;
            } else {
                level -= 1;
            }
        }
    }

    /// Returns the last node in the list, or head when empty.
    fn find_last(&self) -> *mut Node {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            // SAFETY: as in `find_greater_or_equal`.
            let next = unsafe { (*x).next(level) };
            if !next.is_null() {
                x = next;
            } else if level == 0 {
                return x;
            } else {
                level -= 1;
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Iterator
// ------------------------------------------------------------------------------------------------

/// Cursor over a skiplist. Observes the published prefix of the list as of
/// each pointer load; safe to use concurrently with the writer.
pub(crate) struct SkipListIterator<'a, C: KeyComparator> {
    list: &'a SkipList<C>,
    node: *const Node,
}

impl<'a, C: KeyComparator> SkipListIterator<'a, C> {
    pub(crate) fn valid(&self) -> bool {
        !self.node.is_null()
    }

    /// The current entry. Requires `valid()`.
    pub(crate) fn key(&self) -> &'a [u8] {
        debug_assert!(self.valid());
        // SAFETY: `valid()` holds; arena data outlives 'a.
        unsafe { std::slice::from_raw_parts((*self.node).key_ptr, (*self.node).key_len) }
    }

    pub(crate) fn next(&mut self) {
        debug_assert!(self.valid());
        // SAFETY: `valid()` holds.
        self.node = unsafe { (*self.node).next(0) };
    }

    pub(crate) fn prev(&mut self) {
        // Search instead of storing back-links: predecessors may change
        // under a concurrent insert, the search always lands correctly.
        debug_assert!(self.valid());
        let node = self.list.find_less_than(self.key());
        self.node = if node == self.list.head {
            ptr::null()
        } else {
            node
        };
    }

    /// Positions at the first entry `>= target`.
    pub(crate) fn seek(&mut self, target: &[u8]) {
        self.node = self.list.find_greater_or_equal(target, None);
    }

    pub(crate) fn seek_to_first(&mut self) {
        // SAFETY: head is always live.
        self.node = unsafe { (*self.list.head).next(0) };
    }

    pub(crate) fn seek_to_last(&mut self) {
        let node = self.list.find_last();
        self.node = if node == self.list.head {
            ptr::null()
        } else {
            node
        };
    }
}
