#![cfg(test)]

//! In-memory file doubles and a recording reporter shared by WAL tests.

use std::sync::{Arc, Mutex};

use crate::env::{SequentialFile, WritableFile};
use crate::error::{Error, Result};
use crate::wal::{BLOCK_SIZE, HEADER_SIZE, LogReader, LogWriter};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// Writable file appending into a shared byte vector.
pub struct MemWritable {
    data: Arc<Mutex<Vec<u8>>>,
}

impl MemWritable {
    pub fn new(data: Arc<Mutex<Vec<u8>>>) -> MemWritable {
        MemWritable { data }
    }
}

impl WritableFile for MemWritable {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.data.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sequential file over an owned byte vector.
pub struct MemSequential {
    data: Vec<u8>,
    pos: usize,
}

impl MemSequential {
    pub fn new(data: Vec<u8>) -> MemSequential {
        MemSequential { data, pos: 0 }
    }
}

impl SequentialFile for MemSequential {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let n = n as usize;
        if n > self.data.len() - self.pos {
            self.pos = self.data.len();
            return Err(Error::invalid_argument("skip past end of file"));
        }
        self.pos += n;
        Ok(())
    }
}

/// Reporter that tallies dropped bytes and remembers the last reason.
#[derive(Default)]
pub struct CountingReporter {
    pub dropped_bytes: usize,
    pub reports: usize,
    pub last_reason: String,
}

pub struct ReporterHandle(pub Arc<Mutex<CountingReporter>>);

impl crate::wal::CorruptionReporter for ReporterHandle {
    fn corruption(&mut self, bytes: usize, reason: &Error) {
        let mut inner = self.0.lock().unwrap();
        inner.dropped_bytes += bytes;
        inner.reports += 1;
        inner.last_reason = reason.to_string();
    }
}

/// A log harness: write records, corrupt bytes, read back.
pub struct LogHarness {
    pub writer: LogWriter<MemWritable>,
    data: Arc<Mutex<Vec<u8>>>,
    pub reporter: Arc<Mutex<CountingReporter>>,
}

impl LogHarness {
    pub fn new() -> LogHarness {
        init_tracing();
        let data = Arc::new(Mutex::new(Vec::new()));
        LogHarness {
            writer: LogWriter::new(MemWritable::new(Arc::clone(&data))),
            data,
            reporter: Arc::default(),
        }
    }

    pub fn write(&mut self, record: &[u8]) {
        self.writer
            .add_record(record)
            .expect("in-memory append cannot fail");
    }

    pub fn written_bytes(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    /// Adds `delta` to the byte at `offset` in the written stream.
    /// Negative offsets index from the end.
    pub fn corrupt(&mut self, offset: isize, delta: u8) {
        let mut data = self.data.lock().unwrap();
        let index = if offset < 0 {
            data.len() - offset.unsigned_abs()
        } else {
            offset as usize
        };
        data[index] = data[index].wrapping_add(delta);
    }

    /// Truncates the written stream by `n` trailing bytes.
    pub fn shrink(&mut self, n: usize) {
        let mut data = self.data.lock().unwrap();
        let len = data.len() - n;
        data.truncate(len);
    }

    /// Appends raw bytes, bypassing framing.
    pub fn append_raw(&mut self, bytes: &[u8]) {
        self.data.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn reader(&self) -> LogReader<MemSequential> {
        self.reader_from(0)
    }

    pub fn reader_from(&self, initial_offset: u64) -> LogReader<MemSequential> {
        let data = self.data.lock().unwrap().clone();
        LogReader::new(
            MemSequential::new(data),
            Some(Box::new(ReporterHandle(self.reporter.clone()))),
            true,
            initial_offset,
        )
    }

    pub fn read_all(&self) -> Vec<Vec<u8>> {
        let mut reader = self.reader();
        let mut records = Vec::new();
        let mut record = Vec::new();
        while reader.read_record(&mut record) {
            records.push(record.clone());
        }
        records
    }

    pub fn dropped_bytes(&self) -> usize {
        self.reporter.lock().unwrap().dropped_bytes
    }

    pub fn reports(&self) -> usize {
        self.reporter.lock().unwrap().reports
    }

    pub fn last_reason(&self) -> String {
        self.reporter.lock().unwrap().last_reason.clone()
    }
}

/// A record of `n` bytes derived from `seed`, large enough to fragment.
pub fn big_string(seed: u8, n: usize) -> Vec<u8> {
    (0..n).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Bytes a record of `n` payload bytes occupies when it fits whole.
pub fn framed_len(n: usize) -> usize {
    HEADER_SIZE + n
}

pub const BLOCK: usize = BLOCK_SIZE;
