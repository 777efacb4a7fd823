//! Error types for the logwarden core.

use thiserror::Error;

/// Errors surfaced by the record store.
///
/// Duplicate inserts are not represented here: the store treats a record
/// whose dedup key already exists as a no-op, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A raw ingest candidate that could not be turned into a record.
///
/// Applies to a single batch entry; the rest of the batch proceeds.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record failed to decode: {0}")]
    Decode(#[from] serde_json::Error),
}
