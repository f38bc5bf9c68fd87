//! Log writer: frames records into physical blocks.

use tracing::trace;

use crate::codec::crc;
use crate::env::WritableFile;
use crate::error::Result;

use super::{BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE, RecordType};

/// Appends framed records to a [`WritableFile`].
///
/// The writer assumes exclusive ownership of the file; nothing else may
/// append while it lives.
pub struct LogWriter<W: WritableFile> {
    dest: W,
    /// Write offset within the current physical block.
    block_offset: usize,
    /// CRC of each type byte, precomputed so a record checksum only has to
    /// extend over its payload.
    type_crc: [u32; MAX_RECORD_TYPE as usize + 1],
}

impl<W: WritableFile> LogWriter<W> {
    /// Wraps a fresh, empty destination file.
    pub fn new(dest: W) -> LogWriter<W> {
        Self::with_dest_length(dest, 0)
    }

    /// Wraps a destination that already holds `dest_length` bytes of log
    /// data (reopening a log for append).
    pub fn with_dest_length(dest: W, dest_length: u64) -> LogWriter<W> {
        let mut type_crc = [0u32; MAX_RECORD_TYPE as usize + 1];
        for (t, slot) in type_crc.iter_mut().enumerate() {
            *slot = crc::value(&[t as u8]);
        }
        LogWriter {
            dest,
            block_offset: (dest_length as usize) % BLOCK_SIZE,
            type_crc,
        }
    }

    /// Appends one logical record, fragmenting it over as many physical
    /// records as needed, and flushes.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data.len();
        let mut offset = 0;
        let mut begin = true;

        // Emit at least one fragment even for an empty record.
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // No room for a header: zero-fill the trailer and start a
                // fresh block.
                if leftover > 0 {
                    const ZEROES: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];
                    self.dest.append(&ZEROES[..leftover])?;
                }
                self.block_offset = 0;
            }
            debug_assert!(BLOCK_SIZE - self.block_offset >= HEADER_SIZE);

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.min(avail);
            let end = fragment_length == left;

            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            self.emit_physical_record(record_type, &data[offset..offset + fragment_length])?;
            offset += fragment_length;
            left -= fragment_length;
            begin = false;
            if left == 0 {
                break;
            }
        }
        trace!(len = data.len(), "log record appended");
        Ok(())
    }

    /// Forces the log to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.dest.sync()
    }

    /// Consumes the writer, handing back the destination file so the
    /// caller can close it.
    pub fn into_file(self) -> W {
        self.dest
    }

    fn emit_physical_record(&mut self, t: RecordType, payload: &[u8]) -> Result<()> {
        let length = payload.len();
        debug_assert!(length <= 0xFFFF);
        debug_assert!(self.block_offset + HEADER_SIZE + length <= BLOCK_SIZE);

        // Checksum of (type ‖ payload), seeded from the per-type CRC.
        let checksum = crc::mask(crc::extend(self.type_crc[t as usize], payload));

        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&checksum.to_le_bytes());
        header[4] = (length & 0xFF) as u8;
        header[5] = (length >> 8) as u8;
        header[6] = t as u8;

        self.dest.append(&header)?;
        self.dest.append(payload)?;
        self.dest.flush()?;
        self.block_offset += HEADER_SIZE + length;
        Ok(())
    }
}
