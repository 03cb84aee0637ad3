//! Passage Harvester: a concurrent chapter harvester
//!
//! This crate fetches chapters of a document unit from a remote passage
//! source for one edition, rewrites or flattens the embedded markup, and
//! persists the results in fixed-size batches.

pub mod catalog;
pub mod config;
pub mod harvester;
pub mod model;
pub mod output;
pub mod rules;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] output::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Harvest interrupted")]
    Interrupted,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse catalog {path}: {source}")]
    Catalog {
        path: String,
        source: serde_json::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Edition '{0}' not found in the edition catalog")]
    UnknownEdition(String),

    #[error("Unit '{0}' not found in the book catalog")]
    UnknownUnit(String),
}

/// Errors raised while loading or validating rewrite rules
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rule document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rule document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Rule #{index} ({tag}): {message}")]
    Invalid {
        index: usize,
        tag: String,
        message: String,
    },

    #[error("Invalid wildcard token '{token}': {source}")]
    Pattern { token: String, source: regex::Error },

    #[error("Wildcard token '{token}' must have exactly one capture group, found {found}")]
    CaptureGroups { token: String, found: usize },
}

/// Errors from a single fetch attempt or an exhausted retry loop
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Watchdog expired after {0:?}")]
    Watchdog(std::time::Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gave up on '{search}' after {attempts} attempts")]
    Exhausted { search: String, attempts: u32 },
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for rule loading
pub type RuleResult<T> = std::result::Result<T, RuleError>;

// Re-export commonly used types
pub use config::Config;
pub use harvester::{harvest_unit, Harvester};
pub use model::{Record, WorkItem};
pub use rules::{RewriteRule, RuleSet};
