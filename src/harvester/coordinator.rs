//! Harvest coordinator - main harvest orchestration logic
//!
//! This module ties the run together:
//! - Resolving the edition, unit and rules before any network activity
//! - Filling the work queue and spawning the worker pool
//! - Fetching, extracting and rewriting inside each worker
//! - Waiting for the queue to drain and flushing the residual batch

use crate::catalog::{BookCatalog, Edition, EditionCatalog};
use crate::config::{Config, ContentMode};
use crate::harvester::extract::{extract_passage, to_ascii, PassageContent};
use crate::harvester::fetcher::FetchClient;
use crate::harvester::queue::{next_job, CompletionBarrier, Job, SharedReceiver, WorkQueue};
use crate::model::{Content, Record, WorkItem};
use crate::output::{Aggregator, CsvSink, FlushRetry, MarkupStore, RunStats, StatsSnapshot};
use crate::rules::{rewrite_fragment, RuleSet};
use crate::{FetchError, HarvestError, Result};
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};

/// What a harvest of one unit will do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPlan {
    /// Unit name as the source searches it
    pub unit: String,

    pub chapters: u32,

    pub edition: Edition,

    /// CSV table receiving the unit's records
    pub target: PathBuf,
}

/// Outcome of one unit harvest
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub plan: UnitPlan,
    pub stats: StatsSnapshot,

    /// Successful batch flushes, including the final one
    pub flushes: u64,

    pub elapsed: Duration,
}

/// Main harvester structure
///
/// Holds everything resolved up front: catalogs, the edition and the rule
/// set. Construction fails with a configuration or rule error before any
/// request is sent.
pub struct Harvester {
    config: Arc<Config>,
    books: BookCatalog,
    edition: Edition,
    rules: Arc<RuleSet>,
    run_date: NaiveDate,
}

/// State shared by the workers of one unit harvest
struct WorkerContext {
    mode: ContentMode,
    ascii_only: bool,
    rules: Arc<RuleSet>,
    markup: MarkupStore,
    aggregator: Aggregator<CsvSink>,
    stats: RunStats,
    barrier: CompletionBarrier,
}

impl Harvester {
    /// Creates a harvester from a validated configuration
    ///
    /// Loads both catalogs and the optional rule document, and resolves the
    /// configured edition.
    pub fn new(config: Config) -> Result<Self> {
        let books = BookCatalog::load(&config.catalog.books_path)?;
        let editions = EditionCatalog::load(&config.catalog.editions_path)?;
        let rules = match &config.catalog.rules_path {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::default(),
        };

        tracing::debug!(
            "Loaded {} editions, {} book lists and {} rewrite rules",
            editions.len(),
            books.books.len(),
            rules.len()
        );

        Self::from_parts(config, books, &editions, rules)
    }

    /// Creates a harvester from already loaded catalogs and rules
    pub fn from_parts(
        config: Config,
        books: BookCatalog,
        editions: &EditionCatalog,
        rules: RuleSet,
    ) -> Result<Self> {
        let mut edition = editions.resolve(&config.harvest.edition)?;
        if config.harvest.ascii_only {
            edition.label = to_ascii(&edition.label);
            edition.id = to_ascii(&edition.id);
        }

        Ok(Self {
            config: Arc::new(config),
            books,
            edition,
            rules: Arc::new(rules),
            run_date: Local::now().date_naive(),
        })
    }

    /// Overrides the date used in output file names
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    pub fn edition(&self) -> &Edition {
        &self.edition
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolves a unit query without touching the network
    pub fn plan(&self, query: &str) -> Result<UnitPlan> {
        let entry = self.books.find_unit(query, &self.edition.id)?;
        Ok(UnitPlan {
            unit: entry.display.clone(),
            chapters: entry.num_chapters,
            edition: self.edition.clone(),
            target: crate::output::target_path(
                &self.config.output.directory,
                &self.edition.id,
                &entry.display,
                self.run_date,
            ),
        })
    }

    /// Harvests several units one after another
    pub async fn harvest(&self, units: &[String]) -> Result<Vec<UnitReport>> {
        let mut reports = Vec::with_capacity(units.len());
        for unit in units {
            reports.push(self.harvest_unit(unit).await?);
        }
        Ok(reports)
    }

    /// Harvests every chapter of one unit
    ///
    /// # Flow
    ///
    /// 1. Resolve the unit and prepare output directories
    /// 2. Queue one work item per chapter
    /// 3. Spawn the worker pool
    /// 4. Wait until every item is acknowledged
    /// 5. Close the queue, join the workers, flush the residual batch
    ///
    /// A worker that fails (a flush that exhausted its retries, a side file
    /// that cannot be written) fails the whole unit.
    pub async fn harvest_unit(&self, query: &str) -> Result<UnitReport> {
        let started = Instant::now();
        let plan = self.plan(query)?;
        let config = &self.config;

        tokio::fs::create_dir_all(&config.output.directory).await?;
        if config.harvest.mode == ContentMode::Markup {
            tokio::fs::create_dir_all(&config.output.markup_directory).await?;
        }

        let sink = CsvSink::new(&config.output.directory, self.run_date);
        let retry = FlushRetry {
            attempts: config.output.flush_attempts,
            backoff: Duration::from_millis(config.output.flush_backoff_ms),
        };

        let queue = WorkQueue::new();
        let queued = queue.enqueue_unit(&plan.unit, plan.chapters, std::slice::from_ref(&plan.edition));
        tracing::info!(
            "Harvesting {} ({} chapters, {}) with {} workers",
            plan.unit,
            queued,
            plan.edition.id,
            config.harvest.workers
        );

        let context = Arc::new(WorkerContext {
            mode: config.harvest.mode,
            ascii_only: config.harvest.ascii_only,
            rules: Arc::clone(&self.rules),
            markup: MarkupStore::new(&config.output.markup_directory, self.run_date),
            aggregator: Aggregator::new(sink, config.harvest.batch_size, retry),
            stats: RunStats::default(),
            barrier: queue.barrier().clone(),
        });

        let mut workers = JoinSet::new();
        for id in 0..config.harvest.workers {
            let client = FetchClient::new(&config.source)?;
            workers.spawn(run_worker(id, client, queue.receiver(), Arc::clone(&context)));
        }

        let barrier = queue.barrier().clone();
        tokio::select! {
            _ = barrier.wait_drained() => {}
            Some(joined) = workers.join_next() => {
                // Workers only return early on failure
                workers.abort_all();
                return Err(early_exit(joined));
            }
        }

        drop(queue);
        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| HarvestError::Worker(e.to_string()))??;
        }

        let residual = context.aggregator.finish().await?;
        tracing::debug!("Final flush wrote {} records", residual);

        let report = UnitReport {
            plan,
            stats: context.stats.snapshot(),
            flushes: context.aggregator.flush_count(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "{} done: {} chapters processed, {} records, {} misses in {:?}",
            report.plan.unit,
            report.stats.processed,
            report.stats.records,
            report.stats.misses,
            report.elapsed
        );

        Ok(report)
    }
}

fn early_exit(joined: std::result::Result<Result<()>, JoinError>) -> HarvestError {
    match joined {
        Ok(Err(e)) => e,
        Ok(Ok(())) => HarvestError::Worker("worker stopped before the queue drained".to_string()),
        Err(e) => HarvestError::Worker(e.to_string()),
    }
}

/// Pulls jobs until the queue is closed
async fn run_worker(
    id: u32,
    mut client: FetchClient,
    receiver: SharedReceiver,
    context: Arc<WorkerContext>,
) -> Result<()> {
    while let Some(Job { item, ticket }) = next_job(&receiver).await {
        context.process(&mut client, &item).await?;
        ticket.acknowledge();

        let processed = context.stats.record_processed();
        tracing::info!(
            "Queue: {} || Processed: {} || Records: {}",
            context.barrier.outstanding(),
            processed,
            context.stats.snapshot().records
        );
    }

    tracing::debug!("Worker {} finished", id);
    Ok(())
}

impl WorkerContext {
    /// Turns one work item into at most one record
    async fn process(&self, client: &mut FetchClient, item: &WorkItem) -> Result<()> {
        let page = match client.fetch_with_retry(item).await {
            Ok(page) => page,
            Err(e @ FetchError::Exhausted { .. }) => {
                tracing::warn!("{}: {}", item, e);
                self.stats.record_abandoned();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let Some(passage) = extract_passage(&page.body, self.mode, self.ascii_only) else {
            tracing::warn!("{}: page has no passage content", item);
            self.stats.record_miss();
            return Ok(());
        };

        let content = match passage.content {
            PassageContent::Text(text) => Content::Text(text),
            PassageContent::Markup(fragment) => {
                let mut rewritten = rewrite_fragment(&fragment, &self.rules);
                if self.ascii_only {
                    rewritten = to_ascii(&rewritten);
                }
                Content::MarkupFile(self.markup.write(item, &rewritten).await?)
            }
        };

        self.aggregator
            .push(Record::new(item, passage.title, content))
            .await?;
        self.stats.record_extracted();
        Ok(())
    }
}

/// Harvests one unit with a freshly built [`Harvester`]
///
/// # Example
///
/// ```no_run
/// use passage_harvester::config::load_config;
/// use passage_harvester::harvest_unit;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let report = harvest_unit(config, "Genesis").await?;
/// println!("{} records", report.stats.records);
/// # Ok(())
/// # }
/// ```
pub async fn harvest_unit(config: Config, unit: &str) -> Result<UnitReport> {
    Harvester::new(config)?.harvest_unit(unit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BookEntry;
    use crate::config::{CatalogConfig, HarvestConfig, OutputConfig, SourceConfig};
    use crate::ConfigError;
    use std::collections::BTreeMap;

    fn create_test_config(edition: &str) -> Config {
        Config {
            harvest: HarvestConfig {
                edition: edition.to_string(),
                workers: 2,
                batch_size: 10,
                mode: ContentMode::Text,
                ascii_only: true,
            },
            source: SourceConfig {
                base_url: "http://127.0.0.1:9/passage".to_string(),
                user_agent: "TestHarvester/1.0".to_string(),
                watchdog_timeout_ms: 500,
                request_timeout_ms: 200,
                session_retries: 0,
                session_backoff_ms: 1,
                max_attempts: 1,
                retry_backoff_ms: 0,
            },
            catalog: CatalogConfig {
                books_path: PathBuf::from("books.json"),
                editions_path: PathBuf::from("editions.json"),
                rules_path: None,
            },
            output: OutputConfig {
                directory: PathBuf::from("data"),
                markup_directory: PathBuf::from("data/html"),
                flush_attempts: 1,
                flush_backoff_ms: 1,
            },
        }
    }

    fn books() -> BookCatalog {
        let mut books = BTreeMap::new();
        books.insert(
            "AMP".to_string(),
            vec![
                BookEntry {
                    display: "Genesis".to_string(),
                    num_chapters: 50,
                },
                BookEntry {
                    display: "1 John".to_string(),
                    num_chapters: 5,
                },
            ],
        );
        BookCatalog { books }
    }

    fn editions() -> EditionCatalog {
        EditionCatalog::from_entries([("Amplified (AMP)", "AMP"), ("King James Version (KJV)", "KJV")])
    }

    #[test]
    fn test_plan_resolves_unit_and_edition() {
        let harvester = Harvester::from_parts(create_test_config("amp"), books(), &editions(), RuleSet::default())
            .unwrap()
            .with_run_date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        let plan = harvester.plan("john").unwrap();
        assert_eq!(plan.unit, "1 John");
        assert_eq!(plan.chapters, 5);
        assert_eq!(plan.edition.label, "Amplified");
        assert_eq!(plan.edition.id, "AMP");
        assert_eq!(plan.target, PathBuf::from("data/AMP_1 John_2024-05-01.csv"));
    }

    #[test]
    fn test_unknown_edition_is_fatal() {
        let result = Harvester::from_parts(create_test_config("XYZ"), books(), &editions(), RuleSet::default());
        assert!(matches!(
            result,
            Err(HarvestError::Config(ConfigError::UnknownEdition(_)))
        ));
    }

    #[test]
    fn test_unknown_unit_is_fatal() {
        let harvester =
            Harvester::from_parts(create_test_config("AMP"), books(), &editions(), RuleSet::default()).unwrap();
        assert!(matches!(
            harvester.plan("Maccabees"),
            Err(HarvestError::Config(ConfigError::UnknownUnit(_)))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_source_abandons_items() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = create_test_config("AMP");
        config.output.directory = dir.path().to_path_buf();

        let mut books = BTreeMap::new();
        books.insert(
            "AMP".to_string(),
            vec![BookEntry {
                display: "Jude".to_string(),
                num_chapters: 1,
            }],
        );

        let harvester = Harvester::from_parts(config, BookCatalog { books }, &editions(), RuleSet::default()).unwrap();
        let report = harvester.harvest_unit("Jude").await.unwrap();

        assert_eq!(report.stats.processed, 1);
        assert_eq!(report.stats.abandoned, 1);
        assert_eq!(report.stats.records, 0);
        assert_eq!(report.flushes, 0);
        assert!(!report.plan.target.exists());
    }
}
