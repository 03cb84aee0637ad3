//! Persistence traits and error types
//!
//! This module defines the seam between the batch aggregator and the
//! storage backend that receives flushed batches.

use crate::model::Record;
use thiserror::Error;

/// Errors that can occur while persisting harvested records
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to finish CSV batch: {0}")]
    Encode(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Column headers of every output table
pub const COLUMNS: [&str; 6] = ["Edition", "ID", "Unit", "Chapter", "Title", "Content"];

/// Receiver of flushed batches
///
/// Implementations are only ever called by one flush at a time; the
/// aggregator holds them behind a mutex, so they may keep plain mutable
/// bookkeeping such as which targets already carry a header row.
pub trait BatchSink: Send {
    /// Persists one batch, already sorted by chapter
    fn write_batch(&mut self, batch: &[Record]) -> StorageResult<()>;

    /// Called once after the last batch of a unit has been written
    ///
    /// Batches reach the sink in completion order, so sinks that append
    /// across batches put their targets back in chapter order here.
    fn finalize(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
