//! Log reader: reassembles logical records and survives damage.
//!
//! The reader pulls one physical block at a time into a scratch buffer and
//! stitches `FULL` or `FIRST…LAST` chains back into logical records.
//! Corruption never aborts a read pass: damaged regions are reported to an
//! optional [`CorruptionReporter`] and skipped.
//!
//! When constructed with `initial_offset > 0` the reader starts in
//! *resync* mode: it seeks to the containing block and discards `MIDDLE`/
//! `LAST` fragments until the next record start, since the head of a
//! fragmented record that began before the seek point is unreadable.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use tracing::warn;

use crate::codec::crc;
use crate::codec::decode_fixed32;
use crate::env::SequentialFile;
use crate::error::Error;

use super::{BLOCK_SIZE, HEADER_SIZE, RecordType};

// ------------------------------------------------------------------------------------------------
// Corruption reporting
// ------------------------------------------------------------------------------------------------

/// Receives notice of skipped bytes. `bytes` is the approximate size of
/// the dropped region.
pub trait CorruptionReporter {
    fn corruption(&mut self, bytes: usize, reason: &Error);
}

/// Outcome of reading one physical record.
enum Physical {
    /// A record of the given type; payload is `backing[start..end]`.
    Record {
        t: u8,
        start: usize,
        end: usize,
    },
    /// Clean end of file (including a truncated tail).
    Eof,
    /// A skipped region; the caller abandons any partial logical record.
    Bad,
}

// ------------------------------------------------------------------------------------------------
// LogReader
// ------------------------------------------------------------------------------------------------

/// Single-pass reader over a log file.
pub struct LogReader<F: SequentialFile> {
    file: F,
    reporter: Option<Box<dyn CorruptionReporter>>,
    checksum: bool,

    /// One block of scratch; `buf_start..buf_end` is the unconsumed part.
    backing: Box<[u8]>,
    buf_start: usize,
    buf_end: usize,

    eof: bool,

    /// Offset of the start of the last record returned.
    last_record_offset: u64,
    /// File offset just past the end of the buffered data.
    end_of_buffer_offset: u64,

    /// Caller-requested starting offset; earlier corruption is not
    /// reported, earlier fragments are not returned.
    initial_offset: u64,
    resyncing: bool,
}

impl<F: SequentialFile> LogReader<F> {
    /// Creates a reader that returns records starting at the first
    /// physical position `>= initial_offset`.
    ///
    /// `checksum` enables CRC verification of every physical record.
    pub fn new(
        file: F,
        reporter: Option<Box<dyn CorruptionReporter>>,
        checksum: bool,
        initial_offset: u64,
    ) -> LogReader<F> {
        LogReader {
            file,
            reporter,
            checksum,
            backing: vec![0u8; BLOCK_SIZE].into_boxed_slice(),
            buf_start: 0,
            buf_end: 0,
            eof: false,
            last_record_offset: 0,
            end_of_buffer_offset: 0,
            initial_offset,
            resyncing: initial_offset > 0,
        }
    }

    /// Reads the next logical record into `record`, replacing its
    /// contents. Returns `false` at end of input.
    pub fn read_record(&mut self, record: &mut Vec<u8>) -> bool {
        if self.last_record_offset < self.initial_offset && !self.skip_to_initial_block() {
            return false;
        }

        record.clear();
        let mut in_fragmented_record = false;
        // Offset of the first fragment of the record being assembled.
        let mut prospective_record_offset = 0u64;

        loop {
            let physical = self.read_physical_record();

            let (t, start, end) = match physical {
                Physical::Record { t, start, end } => (t, start, end),
                Physical::Eof => {
                    if in_fragmented_record {
                        // The writer died mid-record; the partial body is
                        // not surfaced as corruption.
                        record.clear();
                    }
                    return false;
                }
                Physical::Bad => {
                    if in_fragmented_record {
                        self.report_corruption(record.len(), "error in middle of record");
                        in_fragmented_record = false;
                        record.clear();
                    }
                    continue;
                }
            };

            let fragment_len = end - start;
            let physical_record_offset = self.end_of_buffer_offset
                - self.buffered() as u64
                - HEADER_SIZE as u64
                - fragment_len as u64;

            if self.resyncing {
                if t == RecordType::Middle as u8 {
                    continue;
                } else if t == RecordType::Last as u8 {
                    self.resyncing = false;
                    continue;
                } else {
                    self.resyncing = false;
                }
            }

            match t {
                t if t == RecordType::Full as u8 => {
                    if in_fragmented_record && !record.is_empty() {
                        self.report_corruption(record.len(), "partial record without end(1)");
                    }
                    record.clear();
                    record.extend_from_slice(&self.backing[start..end]);
                    self.last_record_offset = physical_record_offset;
                    return true;
                }
                t if t == RecordType::First as u8 => {
                    if in_fragmented_record && !record.is_empty() {
                        self.report_corruption(record.len(), "partial record without end(2)");
                    }
                    prospective_record_offset = physical_record_offset;
                    record.clear();
                    record.extend_from_slice(&self.backing[start..end]);
                    in_fragmented_record = true;
                }
                t if t == RecordType::Middle as u8 => {
                    if !in_fragmented_record {
                        self.report_corruption(
                            fragment_len,
                            "missing start of fragmented record(1)",
                        );
                    } else {
                        record.extend_from_slice(&self.backing[start..end]);
                    }
                }
                t if t == RecordType::Last as u8 => {
                    if !in_fragmented_record {
                        self.report_corruption(
                            fragment_len,
                            "missing start of fragmented record(2)",
                        );
                    } else {
                        record.extend_from_slice(&self.backing[start..end]);
                        self.last_record_offset = prospective_record_offset;
                        return true;
                    }
                }
                unknown => {
                    let extra = if in_fragmented_record {
                        record.len()
                    } else {
                        0
                    };
                    self.report_corruption(
                        fragment_len + extra,
                        &format!("unknown record type {unknown}"),
                    );
                    in_fragmented_record = false;
                    record.clear();
                }
            }
        }
    }

    /// Offset of the first physical record of the last logical record
    /// returned by [`read_record`](Self::read_record).
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    fn buffered(&self) -> usize {
        self.buf_end - self.buf_start
    }

    /// Positions the underlying file at the start of the first block that
    /// can contain `initial_offset`.
    fn skip_to_initial_block(&mut self) -> bool {
        let offset_in_block = self.initial_offset % BLOCK_SIZE as u64;
        let mut block_start_location = self.initial_offset - offset_in_block;

        // Inside the trailer: the offset can only be in the next block.
        if offset_in_block > (BLOCK_SIZE - 6) as u64 {
            block_start_location += BLOCK_SIZE as u64;
        }

        self.end_of_buffer_offset = block_start_location;

        if block_start_location > 0 {
            if let Err(e) = self.file.skip(block_start_location) {
                self.report_drop(block_start_location as usize, &e);
                return false;
            }
        }
        true
    }

    fn read_physical_record(&mut self) -> Physical {
        loop {
            if self.buffered() < HEADER_SIZE {
                if !self.eof {
                    // The last read was a full block; whatever is left is
                    // a zero trailer to skip.
                    self.buf_start = 0;
                    self.buf_end = 0;
                    match self.file.read(&mut self.backing) {
                        Ok(n) => {
                            self.buf_end = n;
                            self.end_of_buffer_offset += n as u64;
                            if n < BLOCK_SIZE {
                                self.eof = true;
                            }
                        }
                        Err(e) => {
                            self.buf_start = 0;
                            self.buf_end = 0;
                            self.report_drop(BLOCK_SIZE, &e);
                            self.eof = true;
                            return Physical::Eof;
                        }
                    }
                    continue;
                }
                // A leftover partial header at EOF means the writer
                // crashed mid-header; that is EOF, not corruption.
                self.buf_start = 0;
                self.buf_end = 0;
                return Physical::Eof;
            }

            let header = &self.backing[self.buf_start..self.buf_start + HEADER_SIZE];
            let length = (header[4] as usize) | ((header[5] as usize) << 8);
            let t = header[6];

            if HEADER_SIZE + length > self.buffered() {
                let drop_size = self.buffered();
                self.buf_start = 0;
                self.buf_end = 0;
                if !self.eof {
                    self.report_corruption(drop_size, "bad record length");
                    return Physical::Bad;
                }
                // Truncated final record: the writer died mid-payload.
                return Physical::Eof;
            }

            if t == RecordType::Zero as u8 && length == 0 {
                // Preallocated (zeroed) region; skip silently.
                self.buf_start = 0;
                self.buf_end = 0;
                return Physical::Bad;
            }

            if self.checksum {
                let expected = crc::unmask(decode_fixed32(header));
                let payload_start = self.buf_start + HEADER_SIZE;
                let actual =
                    crc::value(&self.backing[self.buf_start + 6..payload_start + length]);
                if actual != expected {
                    let drop_size = self.buffered();
                    self.buf_start = 0;
                    self.buf_end = 0;
                    self.report_corruption(drop_size, "checksum mismatch");
                    return Physical::Bad;
                }
            }

            let start = self.buf_start + HEADER_SIZE;
            let end = start + length;
            self.buf_start = end;

            // A record that began before the requested start offset is not
            // ours to return.
            if (self.end_of_buffer_offset
                - self.buffered() as u64
                - HEADER_SIZE as u64
                - length as u64)
                < self.initial_offset
            {
                return Physical::Bad;
            }

            return Physical::Record { t, start, end };
        }
    }

    fn report_corruption(&mut self, bytes: usize, reason: &str) {
        self.report_drop(bytes, &Error::corruption(reason));
    }

    fn report_drop(&mut self, bytes: usize, reason: &Error) {
        // Suppress reports for regions entirely before the initial offset.
        let region_start = self
            .end_of_buffer_offset
            .saturating_sub(self.buffered() as u64)
            .saturating_sub(bytes as u64);
        if region_start >= self.initial_offset {
            warn!(bytes, %reason, "log reader dropped bytes");
            if let Some(reporter) = &mut self.reporter {
                reporter.corruption(bytes, reason);
            }
        }
    }
}
