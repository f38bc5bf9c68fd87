//! Bump allocator backing a memtable.
//!
//! All skiplist nodes and entry bytes for one memtable come out of one
//! arena. Allocation only ever moves a pointer forward; nothing is freed
//! individually. When the memtable's last reference drops, the arena drops
//! with it and releases every block at once.
//!
//! # Concurrency
//!
//! Allocation is single-threaded: only the memtable's writer allocates,
//! matching the skiplist's single-writer contract. The one concession to
//! readers is [`Arena::memory_usage`], a relaxed atomic the engine polls
//! from other threads to decide when to rotate memtables.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Size of a standard arena block.
const BLOCK_SIZE: usize = 4096;

/// Allocation alignment used by [`Arena::allocate_aligned`].
const ALIGN: usize = if size_of::<usize>() > 8 {
    size_of::<usize>()
} else {
    8
};

// ------------------------------------------------------------------------------------------------
// Owned blocks
// ------------------------------------------------------------------------------------------------

/// One heap block owned by the arena. Always allocated with [`ALIGN`]
/// alignment so a fresh block can satisfy an aligned request directly.
struct ArenaBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl ArenaBlock {
    fn new(size: usize) -> ArenaBlock {
        let layout = Layout::from_size_align(size, ALIGN).expect("arena block layout");
        // SAFETY: `size` is non-zero for every call site.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        ArenaBlock { ptr, layout }
    }
}

impl Drop for ArenaBlock {
    fn drop(&mut self) {
        // SAFETY: allocated with this exact layout in `ArenaBlock::new`.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// ------------------------------------------------------------------------------------------------
// Arena
// ------------------------------------------------------------------------------------------------

pub(crate) struct Arena {
    /// Bump pointer into the current block.
    alloc_ptr: Cell<*mut u8>,

    /// Bytes left in the current block.
    alloc_bytes_remaining: Cell<usize>,

    /// Every block ever allocated; freed together on drop.
    blocks: RefCell<Vec<ArenaBlock>>,

    /// Total bytes held, including per-block bookkeeping.
    memory_usage: AtomicUsize,
}

// SAFETY: the arena is only mutated by the single writer that owns the
// memtable; concurrent readers touch nothing but `memory_usage`, which is
// atomic. Pointers handed out remain valid until the arena drops.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    pub(crate) fn new() -> Arena {
        Arena {
            alloc_ptr: Cell::new(std::ptr::null_mut()),
            alloc_bytes_remaining: Cell::new(0),
            blocks: RefCell::new(Vec::new()),
            memory_usage: AtomicUsize::new(0),
        }
    }

    /// Returns a pointer to `bytes` fresh bytes. No alignment guarantee.
    pub(crate) fn allocate(&self, bytes: usize) -> *mut u8 {
        debug_assert!(bytes > 0);
        if bytes <= self.alloc_bytes_remaining.get() {
            let result = self.alloc_ptr.get();
            // SAFETY: `bytes` fits in the current block.
            self.alloc_ptr.set(unsafe { result.add(bytes) });
            self.alloc_bytes_remaining
                .set(self.alloc_bytes_remaining.get() - bytes);
            return result;
        }
        self.allocate_fallback(bytes)
    }

    /// Returns a pointer to `bytes` fresh bytes aligned to
    /// `max(size_of::<usize>(), 8)`.
    pub(crate) fn allocate_aligned(&self, bytes: usize) -> *mut u8 {
        debug_assert!(ALIGN.is_power_of_two());
        let current_mod = self.alloc_ptr.get() as usize & (ALIGN - 1);
        let slop = if current_mod == 0 {
            0
        } else {
            ALIGN - current_mod
        };
        let needed = bytes + slop;

        let result = if needed <= self.alloc_bytes_remaining.get() {
            // SAFETY: `needed` fits in the current block.
            let result = unsafe { self.alloc_ptr.get().add(slop) };
            self.alloc_ptr.set(unsafe { result.add(bytes) });
            self.alloc_bytes_remaining
                .set(self.alloc_bytes_remaining.get() - needed);
            result
        } else {
            // Fallback blocks start ALIGN-aligned.
            self.allocate_fallback(bytes)
        };
        debug_assert_eq!(result as usize & (ALIGN - 1), 0);
        result
    }

    /// Copies `data` into the arena and returns the stored slice's start.
    pub(crate) fn copy_bytes(&self, data: &[u8]) -> *const u8 {
        if data.is_empty() {
            return NonNull::<u8>::dangling().as_ptr();
        }
        let dst = self.allocate(data.len());
        // SAFETY: `dst` points at `data.len()` writable bytes.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        dst
    }

    /// Total bytes held by the arena.
    pub(crate) fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn allocate_fallback(&self, bytes: usize) -> *mut u8 {
        if bytes > BLOCK_SIZE / 4 {
            // Large request: dedicated block, so the partially-used current
            // block keeps serving small allocations.
            return self.allocate_new_block(bytes);
        }

        let ptr = self.allocate_new_block(BLOCK_SIZE);
        // SAFETY: the fresh block holds BLOCK_SIZE >= bytes.
        self.alloc_ptr.set(unsafe { ptr.add(bytes) });
        self.alloc_bytes_remaining.set(BLOCK_SIZE - bytes);
        ptr
    }

    fn allocate_new_block(&self, block_bytes: usize) -> *mut u8 {
        let block = ArenaBlock::new(block_bytes);
        let ptr = block.ptr.as_ptr();
        self.blocks.borrow_mut().push(block);
        self.memory_usage
            .fetch_add(block_bytes + size_of::<usize>(), Ordering::Relaxed);
        ptr
    }
}
