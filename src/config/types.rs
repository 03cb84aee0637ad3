use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub source: SourceConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
}

/// How extracted chapter content is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Flatten paragraphs into a single line of verse text
    Text,

    /// Keep the rewritten markup fragment in a side file
    Markup,
}

/// Harvest run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Edition id to harvest (matched case-insensitively against the catalog)
    pub edition: String,

    /// Number of parallel workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Records per persisted batch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_mode")]
    pub mode: ContentMode,

    /// Drop non-ASCII characters from titles and content
    #[serde(rename = "ascii-only", default = "default_true")]
    pub ascii_only: bool,
}

/// Remote source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Passage endpoint queried with `search` and `version` parameters
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on one whole fetch attempt (milliseconds)
    #[serde(rename = "watchdog-timeout-ms", default = "default_watchdog_ms")]
    pub watchdog_timeout_ms: u64,

    /// Per-request transport timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_ms")]
    pub request_timeout_ms: u64,

    /// Transport retries performed inside a session
    #[serde(rename = "session-retries", default = "default_session_retries")]
    pub session_retries: u32,

    #[serde(rename = "session-backoff-ms", default = "default_session_backoff_ms")]
    pub session_backoff_ms: u64,

    /// Attempts per work item, 0 retries forever
    #[serde(rename = "max-attempts", default)]
    pub max_attempts: u32,

    /// Pause between attempts of the caller retry loop (milliseconds)
    #[serde(rename = "retry-backoff-ms", default)]
    pub retry_backoff_ms: u64,
}

impl SourceConfig {
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Locations of the static catalogs
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// JSON map of edition to book list with chapter counts
    #[serde(rename = "books-path")]
    pub books_path: PathBuf,

    /// JSON map of edition label to edition id
    #[serde(rename = "editions-path")]
    pub editions_path: PathBuf,

    /// Optional TOML rule document for markup rewriting
    #[serde(rename = "rules-path", default)]
    pub rules_path: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one CSV file per edition and unit
    pub directory: PathBuf,

    /// Directory receiving rewritten markup fragments
    #[serde(rename = "markup-directory")]
    pub markup_directory: PathBuf,

    /// Attempts per batch flush before the run fails
    #[serde(rename = "flush-attempts", default = "default_flush_attempts")]
    pub flush_attempts: u32,

    #[serde(rename = "flush-backoff-ms", default = "default_flush_backoff_ms")]
    pub flush_backoff_ms: u64,
}

fn default_workers() -> u32 {
    20
}

fn default_batch_size() -> usize {
    100
}

fn default_mode() -> ContentMode {
    ContentMode::Text
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_watchdog_ms() -> u64 {
    5000
}

fn default_request_ms() -> u64 {
    3000
}

fn default_session_retries() -> u32 {
    1
}

fn default_session_backoff_ms() -> u64 {
    100
}

fn default_flush_attempts() -> u32 {
    3
}

fn default_flush_backoff_ms() -> u64 {
    200
}
