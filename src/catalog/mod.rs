//! Static catalogs consumed by a harvest run
//!
//! Two JSON documents describe what can be harvested:
//! - the book catalog, listing every unit with its chapter count per edition
//! - the edition catalog, mapping display labels to the ids the source expects
//!
//! Both are resolved before any work is queued; a miss is a configuration
//! error and aborts the run.

use crate::model::edition_display_name;
use crate::ConfigError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One unit in the book catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookEntry {
    /// Name as the source displays and searches it
    pub display: String,

    /// Number of chapters in the unit
    pub num_chapters: u32,
}

/// Unit → chapter-count catalog, keyed by edition id
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookCatalog {
    pub books: BTreeMap<String, Vec<BookEntry>>,
}

/// An edition resolved from the edition catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edition {
    /// Label with the "(ID)" suffix removed
    pub label: String,

    /// Id understood by the source
    pub id: String,
}

/// Edition label → edition id catalog
#[derive(Debug, Clone, Default)]
pub struct EditionCatalog {
    entries: BTreeMap<String, String>,
}

impl BookCatalog {
    /// Loads the book catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, path)
    }

    fn from_json(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|source| ConfigError::Catalog {
            path: path.display().to_string(),
            source,
        })
    }

    /// Finds a unit by name for the given edition
    ///
    /// Lookup prefers a case-insensitive exact match on the display name and
    /// falls back to the first display name containing the query. When the
    /// edition has no list of its own, the list under the alphabetically
    /// first edition key is used, whatever order the document lists them in.
    pub fn find_unit(&self, query: &str, edition_id: &str) -> Result<&BookEntry, ConfigError> {
        let books = self
            .books
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(edition_id))
            .or_else(|| self.books.iter().next())
            .map(|(_, books)| books)
            .ok_or_else(|| ConfigError::UnknownUnit(query.to_string()))?;

        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ConfigError::UnknownUnit(query.to_string()));
        }

        books
            .iter()
            .find(|b| b.display.to_lowercase() == needle)
            .or_else(|| books.iter().find(|b| b.display.to_lowercase().contains(&needle)))
            .ok_or_else(|| ConfigError::UnknownUnit(query.to_string()))
    }
}

impl EditionCatalog {
    /// Loads the edition catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let entries = serde_json::from_str(&content).map_err(|source| ConfigError::Catalog {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { entries })
    }

    /// Builds a catalog from (label, id) pairs
    pub fn from_entries<I, L, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (L, D)>,
        L: Into<String>,
        D: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(label, id)| (label.into(), id.into()))
                .collect(),
        }
    }

    /// Resolves a requested edition id (case-insensitive)
    pub fn resolve(&self, requested: &str) -> Result<Edition, ConfigError> {
        self.entries
            .iter()
            .find(|(_, id)| id.eq_ignore_ascii_case(requested.trim()))
            .map(|(label, id)| Edition {
                label: edition_display_name(label, id),
                id: id.clone(),
            })
            .ok_or_else(|| ConfigError::UnknownEdition(requested.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
