//! Side files for rewritten markup fragments
//!
//! In markup mode each chapter's rewritten fragment is stored in its own
//! file and the record's content column carries only the file name.

use crate::model::WorkItem;
use crate::output::csv_sink::file_component;
use crate::output::traits::StorageResult;
use chrono::NaiveDate;
use std::path::PathBuf;

/// Writes `{edition id}_{unit}_{chapter}_{run date}.html` files
#[derive(Debug, Clone)]
pub struct MarkupStore {
    directory: PathBuf,
    run_date: NaiveDate,
}

impl MarkupStore {
    pub fn new(directory: impl Into<PathBuf>, run_date: NaiveDate) -> Self {
        Self {
            directory: directory.into(),
            run_date,
        }
    }

    /// File name used for a work item's fragment
    pub fn file_name(&self, item: &WorkItem) -> String {
        format!(
            "{}_{}_{}_{}.html",
            file_component(&item.edition_id),
            file_component(&item.unit),
            item.chapter,
            self.run_date.format("%Y-%m-%d")
        )
    }

    /// Stores a fragment and returns the file name recorded in the table
    pub async fn write(&self, item: &WorkItem, fragment: &str) -> StorageResult<String> {
        let name = self.file_name(item);
        tokio::fs::write(self.directory.join(&name), fragment).await?;
        tracing::debug!("Stored markup for {} in {}", item, name);
        Ok(name)
    }
}
