//! # logwarden-core
//!
//! Core types and storage for logwarden -- a log ingestion-and-analysis
//! pipeline for operating-system event logs.
//!
//! This crate defines the record model and its ingest-side normalization,
//! the SQLite-backed record store with its dedup constraint, query filters,
//! aggregation, and the daemon configuration. Everything here is synchronous;
//! async wiring lives in `logwarden-daemon`.

pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod store;

pub use error::{NormalizeError, StoreError};
pub use filter::{Granularity, RecordFilter};
pub use record::{LogRecord, RawRecord};
pub use store::{AggregationResult, HistogramBucket, RecordStore};
