//! CSV-backed batch sink
//!
//! One file per (edition id, unit) and run date. The first batch written to
//! a file in this run creates it with a header row; later batches append
//! rows only. Finalizing rewrites each file whose rows arrived out of
//! chapter order.

use crate::model::Record;
use crate::output::traits::{BatchSink, StorageError, StorageResult, COLUMNS};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

const CHAPTER_COLUMN: usize = 3;

/// Writes batches to per-edition, per-unit CSV files
#[derive(Debug)]
pub struct CsvSink {
    directory: PathBuf,
    run_date: NaiveDate,
    headers_written: HashSet<PathBuf>,
}

impl CsvSink {
    pub fn new(directory: impl Into<PathBuf>, run_date: NaiveDate) -> Self {
        Self {
            directory: directory.into(),
            run_date,
            headers_written: HashSet::new(),
        }
    }

    /// Path of the table that receives records of the given edition and unit
    pub fn target_path(&self, edition_id: &str, unit: &str) -> PathBuf {
        target_path(&self.directory, edition_id, unit, self.run_date)
    }

    /// Returns true once a header row has been written to `path` in this run
    pub fn has_header(&self, path: &Path) -> bool {
        self.headers_written.contains(path)
    }

    fn write_target(&mut self, path: PathBuf, rows: &[&Record]) -> StorageResult<()> {
        let first = !self.headers_written.contains(&path);

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        if first {
            writer.write_record(COLUMNS)?;
        }

        for record in rows {
            let chapter = record.chapter.to_string();
            writer.write_record([
                record.edition.as_str(),
                record.edition_id.as_str(),
                record.unit.as_str(),
                chapter.as_str(),
                record.title.as_deref().unwrap_or(""),
                record.content.as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StorageError::Encode(e.to_string()))?;

        // The first flush of a run replaces any table left by an earlier run
        let mut file = if first {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?
        } else {
            OpenOptions::new().create(true).append(true).open(&path)?
        };
        file.write_all(&bytes)?;
        file.flush()?;

        if first {
            self.headers_written.insert(path.clone());
        }

        tracing::info!("{} records saved to {}", rows.len(), path.display());
        Ok(())
    }
}

/// Stable-sorts the data rows of `path` by chapter, keeping the header first
///
/// Files that are already in order are left untouched. The sorted table is
/// staged next to the target and renamed over it.
fn reorder_by_chapter(path: &Path) -> StorageResult<()> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = reader
        .records()
        .collect::<Result<Vec<csv::StringRecord>, _>>()?;

    if rows
        .windows(2)
        .all(|w| chapter_of(&w[0]) <= chapter_of(&w[1]))
    {
        return Ok(());
    }

    rows.sort_by_key(chapter_of);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StorageError::Encode(e.to_string()))?;

    let staged = path.with_extension("csv.sorting");
    std::fs::write(&staged, bytes)?;
    std::fs::rename(&staged, path)?;

    tracing::debug!("Restored chapter order of {} rows in {}", rows.len(), path.display());
    Ok(())
}

fn chapter_of(row: &csv::StringRecord) -> u32 {
    row.get(CHAPTER_COLUMN)
        .and_then(|c| c.parse().ok())
        .unwrap_or(u32::MAX)
}

impl BatchSink for CsvSink {
    fn write_batch(&mut self, batch: &[Record]) -> StorageResult<()> {
        let mut targets: BTreeMap<PathBuf, Vec<&Record>> = BTreeMap::new();
        for record in batch {
            targets
                .entry(self.target_path(&record.edition_id, &record.unit))
                .or_default()
                .push(record);
        }

        for (path, rows) in targets {
            self.write_target(path, &rows)?;
        }

        Ok(())
    }

    fn finalize(&mut self) -> StorageResult<()> {
        for path in &self.headers_written {
            reorder_by_chapter(path)?;
        }
        Ok(())
    }
}

/// Builds `{edition id}_{unit}_{run date}.csv` under `directory`
pub fn target_path(directory: &Path, edition_id: &str, unit: &str, run_date: NaiveDate) -> PathBuf {
    directory.join(format!(
        "{}_{}_{}.csv",
        file_component(edition_id),
        file_component(unit),
        run_date.format("%Y-%m-%d")
    ))
}

/// Makes a value safe to embed in a file name
pub fn file_component(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '-',
            c => c,
        })
        .collect()
}
