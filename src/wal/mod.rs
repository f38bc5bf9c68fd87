//! # Write-Ahead Log Module
//!
//! An append-only log of opaque records, framed so a reader can recover
//! every fully-written record after a crash and skip everything else.
//!
//! ## On-disk layout
//!
//! The file is a sequence of fixed 32 KiB physical blocks. Each block is
//! packed with physical records; a logical record that does not fit in the
//! space remaining is *fragmented* across blocks:
//!
//! ```text
//!       +--- one physical block (32768 bytes) --------------------+
//!      /                                                           \
//!     +----------------+----------------+------------+-------------+
//!     | record         | record         | record     | zero trailer |
//!     +----------------+----------------+------------+-------------+
//!
//!     physical record:
//!     +---------------------+-----------------+------------+---------+
//!     | masked CRC32C (4 B) | length (2 B LE) | type (1 B) | payload |
//!     +---------------------+-----------------+------------+---------+
//! ```
//!
//! - The CRC covers `type ‖ payload` and is stored masked.
//! - A block's final `< 7` bytes cannot hold a header and are zero-filled.
//! - `type` says how the payload relates to a logical record: `FULL` is a
//!   whole record; `FIRST`/`MIDDLE`/`LAST` chain fragments in order.
//!   Type `0` marks preallocated space and never a real record.
//!
//! ## Guarantees
//!
//! - **Durability boundary:** the writer flushes after every record; a
//!   record handed to [`LogWriter::add_record`] without an error is
//!   recoverable unless the tail of the file was torn mid-record.
//! - **Crash tail:** a partially-written record at end of file reads as a
//!   clean EOF, not corruption.
//! - **Damage isolation:** a bad checksum or impossible length drops the
//!   containing block only; reading resumes at the next block.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod reader;
pub mod writer;

pub use reader::{CorruptionReporter, LogReader};
pub use writer::LogWriter;

// ------------------------------------------------------------------------------------------------
// Format constants
// ------------------------------------------------------------------------------------------------

/// Size of one physical block.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Bytes of framing before each payload: CRC (4) + length (2) + type (1).
pub const HEADER_SIZE: usize = 7;

/// Physical record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RecordType {
    /// Reserved for preallocated file space.
    Zero = 0,
    /// A whole logical record.
    Full = 1,
    /// First fragment of a logical record.
    First = 2,
    /// Interior fragment.
    Middle = 3,
    /// Final fragment.
    Last = 4,
}

/// Largest valid [`RecordType`] discriminant.
pub(crate) const MAX_RECORD_TYPE: u8 = RecordType::Last as u8;
