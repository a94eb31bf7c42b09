use std::path::Path;

use log::info;

use crate::config::DbOptions;
use crate::error::DbResult;
use crate::storage::btree::{BTree, TreeStats};
use crate::storage::page::HeaderPage;
use crate::storage::pager::Pager;

/// An open database file.
///
/// All operations go through `&mut self`, so one handle serializes its own
/// callers. Opening the same file twice at once is not supported.
pub struct Database {
    pager: Pager,
}

impl Database {
    /// Open `path` with default options, creating an empty database if needed.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with(path, DbOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: DbOptions) -> DbResult<Self> {
        let pager = Pager::open(path, options)?;
        Ok(Database { pager })
    }

    /// Insert a new record. Fails with [`DbError::DuplicateKey`](crate::DbError::DuplicateKey)
    /// if `key` is already present; the stored value is left untouched.
    pub fn insert(&mut self, key: i64, value: &str) -> DbResult<()> {
        BTree::new(&mut self.pager).insert(key, value)
    }

    pub fn find(&mut self, key: i64) -> DbResult<Option<String>> {
        BTree::new(&mut self.pager).find(key)
    }

    /// Remove a record. Fails with [`DbError::NotFound`](crate::DbError::NotFound) if absent.
    pub fn delete(&mut self, key: i64) -> DbResult<()> {
        BTree::new(&mut self.pager).delete(key)
    }

    /// Walk the whole tree and check its structural invariants.
    pub fn verify(&mut self) -> DbResult<TreeStats> {
        BTree::new(&mut self.pager).verify()
    }

    /// Offsets currently on the free list, most recently released first.
    pub fn free_pages(&mut self) -> DbResult<Vec<u64>> {
        self.pager.free_pages()
    }

    pub fn header(&self) -> HeaderPage {
        *self.pager.header()
    }

    /// Offset of the root page, 0 when the database is empty.
    pub fn root_offset(&self) -> u64 {
        self.pager.root_offset()
    }

    pub fn options(&self) -> &DbOptions {
        self.pager.options()
    }

    /// Flush everything to stable storage and close the file.
    pub fn close(mut self) -> DbResult<()> {
        self.pager.sync_all()?;
        info!("closed database ({} pages)", self.pager.header().page_count);
        Ok(())
    }
}
