//! Run statistics
//!
//! Counters shared by all workers of a run, used for the progress line
//! logged after every acknowledged item and for the final summary.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one harvest run
#[derive(Debug, Default)]
pub struct RunStats {
    processed: AtomicU64,
    records: AtomicU64,
    misses: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`RunStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Work items acknowledged
    pub processed: u64,

    /// Records produced
    pub records: u64,

    /// Fetched pages without a passage container
    pub misses: u64,

    /// Work items whose bounded retry budget ran out
    pub abandoned: u64,
}

impl RunStats {
    pub fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_extracted(&self) {
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Prints a run summary to stdout
pub fn print_summary(unit: &str, edition_id: &str, stats: &StatsSnapshot, flushes: u64) {
    println!("=== {} ({}) ===", unit, edition_id);
    println!("  Chapters processed: {}", stats.processed);
    println!("  Records saved: {} in {} batches", stats.records, flushes);
    if stats.misses > 0 {
        println!("  Chapters without content: {}", stats.misses);
    }
    if stats.abandoned > 0 {
        println!("  Chapters abandoned after retries: {}", stats.abandoned);
    }
}
