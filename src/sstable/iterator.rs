//! The two-level table iterator.
//!
//! The outer level walks the index block; each index entry's value is the
//! handle of one data block, which the inner level iterates. Data blocks
//! load lazily (through the block cache when configured), and the inner
//! iterator is retained while consecutive positioning lands in the same
//! block.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::iterator::Iter;
use crate::options::ReadOptions;

use super::{BlockHandle, Table};
use super::block::BlockIterator;

// ------------------------------------------------------------------------------------------------
// TableIterator
// ------------------------------------------------------------------------------------------------

/// Iterates a whole table in key order.
pub struct TableIterator {
    table: Arc<Table>,
    read_options: ReadOptions,

    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    /// Encoded handle of the block `data_iter` was built from.
    data_block_handle: Vec<u8>,

    status: Option<Error>,
}

impl TableIterator {
    pub(crate) fn new(table: Arc<Table>, read_options: ReadOptions) -> TableIterator {
        let index_iter =
            Arc::clone(table.index_block()).iter(Arc::clone(&table.options().comparator));
        TableIterator {
            table,
            read_options,
            index_iter,
            data_iter: None,
            data_block_handle: Vec::new(),
            status: None,
        }
    }

    fn save_error(&mut self, result: Result<()>) {
        if self.status.is_none() {
            if let Err(e) = result {
                self.status = Some(e);
            }
        }
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|it| it.valid())
    }

    /// (Re)builds `data_iter` for the index entry under the cursor;
    /// reuses it when the handle is unchanged.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            return;
        }
        let handle_value = self.index_iter.value();
        if self.data_iter.is_some() && self.data_block_handle == handle_value {
            // Still inside the same block.
            return;
        }

        let handle_value = handle_value.to_vec();
        match BlockHandle::decode_from(&handle_value)
            .and_then(|(handle, _)| self.table.block_reader(&self.read_options, &handle))
        {
            Ok(block) => {
                self.data_block_handle = handle_value;
                self.data_iter =
                    Some(block.iter(Arc::clone(&self.table.options().comparator)));
            }
            Err(e) => {
                self.save_error(Err(e));
                self.data_iter = None;
            }
        }
    }

    /// Moves forward past data blocks that are empty or failed to load.
    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(data_iter) = &mut self.data_iter {
                data_iter.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(data_iter) = &mut self.data_iter {
                data_iter.seek_to_last();
            }
        }
    }
}

impl Iter for TableIterator {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(data_iter) = &mut self.data_iter {
            data_iter.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(data_iter) = &mut self.data_iter {
            data_iter.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(data_iter) = &mut self.data_iter {
            data_iter.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        if let Some(data_iter) = &mut self.data_iter {
            data_iter.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        if let Some(data_iter) = &mut self.data_iter {
            data_iter.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.data_iter.as_ref().expect("valid implies data").key()
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.data_iter.as_ref().expect("valid implies data").value()
    }

    fn status(&self) -> Result<()> {
        // Outer, then inner, then any saved block-load error.
        self.index_iter.status()?;
        if let Some(data_iter) = &self.data_iter {
            data_iter.status()?;
        }
        match &self.status {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        }
    }
}
