#![cfg(test)]

//! In-memory file doubles shared by the SSTable tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::env::{RandomAccessFile, WritableFile};
use crate::error::Result;
use crate::options::Options;
use crate::sstable::{Table, TableBuilder};

/// Writable file capturing bytes into a shared vector.
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

/// Random-access file over owned bytes, counting positional reads.
pub struct MemRandomAccess {
    data: Vec<u8>,
    reads: Arc<AtomicUsize>,
}

impl MemRandomAccess {
    pub fn new(data: Vec<u8>) -> MemRandomAccess {
        MemRandomAccess {
            data,
            reads: Arc::default(),
        }
    }

    /// A handle observing how many reads the table performs.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl RandomAccessFile for MemRandomAccess {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Builds a table from sorted `(key, value)` pairs, returning its bytes.
pub fn build_table(options: &Options, entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let data = Arc::new(Mutex::new(Vec::new()));
    let mut builder = TableBuilder::new(options.clone(), MemWritable::new(Arc::clone(&data)));
    for (key, value) in entries {
        builder.add(key, value);
    }
    builder.finish().expect("in-memory build cannot fail");
    let bytes = data.lock().unwrap().clone();
    assert_eq!(bytes.len() as u64, builder.file_size());
    bytes
}

/// Opens table bytes, returning the table and a read counter.
pub fn open_table(
    options: &Options,
    bytes: Vec<u8>,
) -> (Arc<Table>, Arc<AtomicUsize>) {
    let size = bytes.len() as u64;
    let file = MemRandomAccess::new(bytes);
    let reads = file.read_counter();
    let table = Table::open(options.clone(), Box::new(file), size).expect("open");
    (table, reads)
}

/// `k%06d`-style key used across the table tests.
pub fn table_key(i: usize) -> Vec<u8> {
    format!("k{i:06}").into_bytes()
}

pub fn table_value(i: usize) -> Vec<u8> {
    format!("v{i:06}").into_bytes()
}
