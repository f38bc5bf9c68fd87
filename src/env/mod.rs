//! Filesystem collaborator surface.
//!
//! The engine core performs I/O only through these three traits, which
//! keep the format code testable (tests substitute counting or in-memory
//! files) and keep platform concerns out of the core:
//!
//! - [`WritableFile`] — append-only sink for WAL segments and tables
//!   under construction. Ownership passes to the writer for its lifetime.
//! - [`RandomAccessFile`] — positional reads over an immutable table.
//!   Must be safe for concurrent `read_at` calls.
//! - [`SequentialFile`] — single-pass forward reads for WAL replay.
//!
//! Default implementations back onto `std::fs`; random access memory-maps
//! the file, which is safe here because tables are immutable once written.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{Error, Result};

// ------------------------------------------------------------------------------------------------
// Traits
// ------------------------------------------------------------------------------------------------

/// Append-only output file.
pub trait WritableFile: Send {
    /// Appends `data` at the current end of file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Pushes buffered bytes to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Forces written bytes to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Flushes and closes. The file must not be used afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Immutable file readable at arbitrary offsets, concurrently.
pub trait RandomAccessFile: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read (short only at end of file).
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total file length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// File read once, front to back.
pub trait SequentialFile: Send {
    /// Reads up to `buf.len()` bytes, returning the count; `0` at EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skips `n` bytes forward.
    fn skip(&mut self, n: u64) -> Result<()>;
}

// ------------------------------------------------------------------------------------------------
// std::fs-backed implementations
// ------------------------------------------------------------------------------------------------

/// [`WritableFile`] over a plain `std::fs::File`.
pub struct FsWritableFile {
    file: File,
}

impl FsWritableFile {
    /// Creates (truncating) a writable file at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<FsWritableFile> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "writable file created");
        Ok(FsWritableFile { file })
    }

    /// Opens `path` for appending, preserving existing content.
    pub fn open_for_append(path: impl AsRef<Path>) -> Result<FsWritableFile> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(FsWritableFile { file })
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// [`RandomAccessFile`] that memory-maps the whole file.
///
/// Uses `unsafe { Mmap::map(...) }` but is memory-safe because the mapped
/// file is never written after creation (tables are immutable), the map is
/// read-only, and every slice is bounds-checked against the map length.
pub struct MmapRandomAccessFile {
    map: Option<Mmap>,
}

impl MmapRandomAccessFile {
    pub fn open(path: impl AsRef<Path>) -> Result<MmapRandomAccessFile> {
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        // Mapping a zero-length file fails on some platforms; an empty
        // table is representable without a map at all.
        let map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file)? })
        };
        debug!(path = %path.as_ref().display(), len, "table file mapped");
        Ok(MmapRandomAccessFile { map })
    }
}

impl RandomAccessFile for MmapRandomAccessFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Some(map) = &self.map else { return Ok(0) };
        let offset = offset as usize;
        if offset >= map.len() {
            return Ok(0);
        }
        let n = buf.len().min(map.len() - offset);
        buf[..n].copy_from_slice(&map[offset..offset + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.map.as_ref().map_or(0, |m| m.len() as u64)
    }
}

/// [`SequentialFile`] over a plain `std::fs::File`.
pub struct FsSequentialFile {
    file: File,
}

impl FsSequentialFile {
    pub fn open(path: impl AsRef<Path>) -> Result<FsSequentialFile> {
        Ok(FsSequentialFile {
            file: File::open(path.as_ref())?,
        })
    }
}

impl SequentialFile for FsSequentialFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        // Loop over short reads so a partial kernel read mid-file is not
        // mistaken for end of file by the WAL reader.
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::from(e)),
            }
        }
        Ok(filled)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        self.file.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Reads exactly `buf.len()` bytes at `offset` or fails with `Corruption`
/// (the caller asked for bytes the file claims to have).
pub(crate) fn read_exact_at(file: &dyn RandomAccessFile, offset: u64, buf: &mut [u8]) -> Result<()> {
    let n = file.read_at(offset, buf)?;
    if n != buf.len() {
        return Err(Error::corruption("truncated read"));
    }
    Ok(())
}
