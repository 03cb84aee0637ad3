//! Output module for persisting harvested records
//!
//! This module handles:
//! - Accumulating records into fixed-size batches
//! - Writing batches to per-edition CSV tables
//! - Storing rewritten markup fragments in side files
//! - Tracking run statistics

mod aggregator;
mod csv_sink;
mod markup;
pub mod stats;
mod traits;

pub use aggregator::{Aggregator, FlushRetry};
pub use csv_sink::{file_component, target_path, CsvSink};
pub use markup::MarkupStore;
pub use stats::{print_summary, RunStats, StatsSnapshot};
pub use traits::{BatchSink, StorageError, StorageResult, COLUMNS};
