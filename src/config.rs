//! Options accepted when opening a database file.

use crate::error::{DbError, DbResult};

/// Number of pages carved from the end of the file whenever the free list runs dry.
pub const DEFAULT_FREE_PAGE_BATCH: u64 = 10;

/// Durability mode for page writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Synchronous {
    /// `sync_data` after every page write.
    #[default]
    Full,
    /// Writes reach the OS page cache only; nothing is forced to stable storage.
    Off,
}

impl Synchronous {
    pub fn as_str(self) -> &'static str {
        match self {
            Synchronous::Full => "full",
            Synchronous::Off => "off",
        }
    }
}

/// Configuration for [`crate::Database::open_with`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbOptions {
    pub synchronous: Synchronous,
    /// Pages added per free-list extension. Must be non-zero.
    pub free_page_batch: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        DbOptions {
            synchronous: Synchronous::Full,
            free_page_batch: DEFAULT_FREE_PAGE_BATCH,
        }
    }
}

impl DbOptions {
    pub fn synchronous(mut self, synchronous: Synchronous) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn free_page_batch(mut self, pages: u64) -> Self {
        self.free_page_batch = pages;
        self
    }

    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.free_page_batch == 0 {
            return Err(DbError::InvalidOptions("free_page_batch must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sync_every_write() {
        let options = DbOptions::default();
        assert_eq!(options.synchronous, Synchronous::Full);
        assert_eq!(options.synchronous.as_str(), "full");
        assert_eq!(options.free_page_batch, DEFAULT_FREE_PAGE_BATCH);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let options = DbOptions::default().free_page_batch(0);
        assert!(matches!(options.validate(), Err(DbError::InvalidOptions(_))));
        assert!(DbOptions::default().validate().is_ok());
    }
}
