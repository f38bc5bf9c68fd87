//! # StratumDB
//!
//! The storage-engine core of an embedded, ordered key-value store in the
//! LSM-tree tradition: variable-length byte keys mapped to byte values
//! under a pluggable total order, every change stamped with a monotonic
//! sequence number, persisted through an append-only write-ahead log and
//! immutable block-structured sorted tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        write path                          │
//! │   WriteBatch ──► LogWriter (WAL) ──► MemTable (skiplist)   │
//! │                                          │ flush           │
//! │                                          ▼                 │
//! │   TableBuilder ──► SSTable file (blocks + filter + index)  │
//! ├────────────────────────────────────────────────────────────┤
//! │                        read path                           │
//! │   MemTable::get ──► Table::get ◄── sharded LRU block cache │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`codec`] | Fixed/varint integer encodings and masked CRC32C |
//! | [`comparator`] | User-key ordering, bytewise by default |
//! | [`key`] | Internal-key format binding key + sequence + type |
//! | [`memtable`] | Arena-backed lock-free-read skiplist staging writes |
//! | [`wal`] | Block-framed write-ahead log writer/reader |
//! | [`sstable`] | Immutable sorted tables: builder, reader, iterators |
//! | [`filter`] | Pluggable bloom-style point-lookup filters |
//! | [`cache`] | Sharded LRU cache with refcounted handles |
//! | [`batch`] | Atomic write batches replayed into the memtable |
//! | [`env`] | Filesystem traits the engine performs all I/O through |
//!
//! The orchestration above this core — memtable rotation, compaction,
//! version sets, recovery — belongs to the embedding database, which
//! composes these pieces through the contracts documented per module.

pub mod batch;
pub mod cache;
pub mod codec;
pub mod comparator;
pub mod compression;
pub mod env;
pub mod error;
pub mod filter;
pub mod iterator;
pub mod key;
pub mod memtable;
pub mod options;
pub mod sstable;
pub mod util;
pub mod wal;

pub use batch::{BatchHandler, WriteBatch};
pub use cache::{CacheHandle, LruCache};
pub use comparator::{BytewiseComparator, Comparator};
pub use compression::CompressionType;
pub use error::{Error, Result};
pub use filter::{BloomFilterPolicy, FilterPolicy};
pub use iterator::Iter;
pub use key::{
    InternalFilterPolicy, InternalKey, InternalKeyComparator, LookupKey, MAX_SEQUENCE_NUMBER,
    SequenceNumber, ValueType,
};
pub use memtable::MemTable;
pub use options::{BlockCache, Options, ReadOptions};
pub use sstable::{Table, TableBuilder};
pub use wal::{LogReader, LogWriter};
