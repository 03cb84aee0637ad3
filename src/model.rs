//! Work items and harvested records
//!
//! A [`WorkItem`] names one chapter of one unit in one edition. Workers turn
//! each item into at most one [`Record`], which the aggregator persists.

use std::fmt;

/// One (unit, chapter, edition) fetch task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Document unit as understood by the source (e.g. "Genesis")
    pub unit: String,

    /// Chapter number, starting at 1
    pub chapter: u32,

    /// Human readable edition label with any "(ID)" suffix removed
    pub edition: String,

    /// Edition id sent to the source (e.g. "AMP")
    pub edition_id: String,
}

impl WorkItem {
    /// Query term understood by the passage source
    pub fn search_term(&self) -> String {
        format!("{} {}", self.unit, self.chapter)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.unit, self.chapter, self.edition_id)
    }
}

/// Extracted chapter content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Flattened verse text
    Text(String),

    /// File name of the side-stored rewritten markup fragment
    MarkupFile(String),
}

impl Content {
    pub fn as_str(&self) -> &str {
        match self {
            Content::Text(text) => text,
            Content::MarkupFile(name) => name,
        }
    }
}

/// Structured result for one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub edition: String,
    pub edition_id: String,
    pub unit: String,
    pub chapter: u32,
    pub title: Option<String>,
    pub content: Content,
}

impl Record {
    /// Builds a record carrying the identity of its work item
    pub fn new(item: &WorkItem, title: Option<String>, content: Content) -> Self {
        Self {
            edition: item.edition.clone(),
            edition_id: item.edition_id.clone(),
            unit: item.unit.clone(),
            chapter: item.chapter,
            title,
            content,
        }
    }
}

/// Strips a trailing "(ID)" from an edition label
///
/// "Amplified Bible (AMP)" becomes "Amplified Bible"; labels that do not
/// carry the id are returned trimmed.
pub fn edition_display_name(label: &str, edition_id: &str) -> String {
    let suffix = format!("({})", edition_id);
    match label.find(&suffix) {
        Some(pos) => label[..pos].trim().to_string(),
        None => label.trim().to_string(),
    }
}
