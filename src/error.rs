use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("page offset {0} is not aligned to the page size")]
    MisalignedOffset(u64),
    #[error("page offset {offset} is outside the {page_count} allocated pages")]
    OffsetOutOfRange { offset: u64, page_count: u64 },
    #[error("page allocation failed: {0}")]
    Allocation(#[source] Box<DbError>),
    #[error("duplicate key {0}")]
    DuplicateKey(i64),
    #[error("key {0} not found")]
    NotFound(i64),
    #[error("value of {len} bytes exceeds the 120 byte limit")]
    ValueTooLong { len: usize },
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),
    #[error("invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("database file is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DbResult<T> = Result<T, DbError>;
