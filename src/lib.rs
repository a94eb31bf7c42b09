pub mod config;
pub mod db;
pub mod error;
pub mod storage;

pub use config::{DbOptions, Synchronous};
pub use db::Database;
pub use error::{DbError, DbResult};
pub use storage::btree::TreeStats;
pub use storage::page::{HeaderPage, PAGE_SIZE, VALUE_SIZE};
