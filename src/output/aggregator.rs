//! Batch aggregation with single-writer flushing
//!
//! Workers push records into one shared buffer. Whenever the buffer length
//! reaches a multiple of the batch size, the pushing worker takes the batch
//! out and flushes it itself. Flushes are serialized by the sink mutex, which
//! also guards the sink's header bookkeeping.

use crate::model::Record;
use crate::output::traits::{BatchSink, StorageError, StorageResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

/// Retry behaviour for a failing flush
#[derive(Debug, Clone, Copy)]
pub struct FlushRetry {
    /// Total attempts per batch, at least 1
    pub attempts: u32,

    /// Delay before the second attempt, doubled for each further attempt
    pub backoff: Duration,
}

impl Default for FlushRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Shared record buffer feeding a [`BatchSink`]
pub struct Aggregator<S: BatchSink> {
    buffer: StdMutex<Vec<Record>>,
    sink: Mutex<S>,
    batch_size: usize,
    retry: FlushRetry,
    flushes: AtomicU64,
}

impl<S: BatchSink> Aggregator<S> {
    /// Creates an aggregator flushing every `batch_size` records
    pub fn new(sink: S, batch_size: usize, retry: FlushRetry) -> Self {
        Self {
            buffer: StdMutex::new(Vec::with_capacity(batch_size)),
            sink: Mutex::new(sink),
            batch_size: batch_size.max(1),
            retry,
            flushes: AtomicU64::new(0),
        }
    }

    /// Appends a record, flushing the completed batch if this push filled it
    pub async fn push(&self, record: Record) -> StorageResult<()> {
        let batch = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|e| StorageError::Lock(format!("record buffer: {}", e)))?;
            buffer.push(record);
            if buffer.len() % self.batch_size == 0 {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            self.flush(batch).await?;
        }

        Ok(())
    }

    /// Flushes whatever is left in the buffer, then finalizes the sink
    ///
    /// Returns the number of records written by this final flush.
    pub async fn finish(&self) -> StorageResult<usize> {
        let residual = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|e| StorageError::Lock(format!("record buffer: {}", e)))?;
            std::mem::take(&mut *buffer)
        };

        let count = residual.len();
        if count > 0 {
            self.flush(residual).await?;
        }

        self.sink.lock().await.finalize()?;
        Ok(count)
    }

    /// Number of records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Number of successful sink invocations so far
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Consumes the aggregator and returns its sink
    pub fn into_sink(self) -> S {
        self.sink.into_inner()
    }

    async fn flush(&self, mut batch: Vec<Record>) -> StorageResult<()> {
        batch.sort_by_key(|record| record.chapter);

        let mut sink = self.sink.lock().await;
        let mut attempt = 1;
        loop {
            match sink.write_batch(&batch) {
                Ok(()) => {
                    self.flushes.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) if attempt < self.retry.attempts => {
                    let delay = self.retry.backoff * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        "Flush of {} records failed (attempt {}/{}): {}; retrying in {:?}",
                        batch.len(),
                        attempt,
                        self.retry.attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Flush of {} records failed after {} attempts: {}",
                        batch.len(),
                        attempt,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }
}
