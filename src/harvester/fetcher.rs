//! HTTP fetcher for passage pages
//!
//! This module handles all requests to the passage source, including:
//! - Building sessions with browser-like default headers
//! - Small in-session retries for transport failures
//! - A watchdog bounding each whole fetch attempt
//! - The per-item retry loop driven by a [`RetryPolicy`]

use crate::config::SourceConfig;
use crate::model::WorkItem;
use crate::FetchError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use reqwest::{Client, Response};
use std::time::Duration;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// Body of a successfully fetched page
#[derive(Debug, Clone)]
pub struct Page {
    pub body: String,
}

/// How often one work item may be attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt limit, `None` retries until the item succeeds
    pub max_attempts: Option<u32>,

    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }
}

/// A reqwest client plus its bounded transport retry
///
/// Sessions are cheap to replace: a transport failure that survives the
/// in-session retries makes the caller discard the session and build a new
/// one, which drops any pooled connections.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl Session {
    /// Builds a session from the source configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use passage_harvester::harvester::Session;
    /// # fn example(config: &passage_harvester::config::SourceConfig) {
    /// let session = Session::new(config).unwrap();
    /// # }
    /// ```
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            retries: config.session_retries,
            backoff: Duration::from_millis(config.session_backoff_ms),
        })
    }

    /// Sends a GET, retrying transport failures up to the session limit
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, reqwest::Error> {
        let mut retry = 0;
        loop {
            match self.client.get(url).query(query).send().await {
                Ok(response) => return Ok(response),
                Err(e) if retry < self.retries => {
                    retry += 1;
                    let delay = self.backoff * 2u32.saturating_pow(retry - 1);
                    tracing::debug!("GET {} failed ({}), session retry {} in {:?}", url, e, retry, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fetches passage pages for work items
pub struct FetchClient {
    config: SourceConfig,
    session: Session,
    policy: RetryPolicy,
}

impl FetchClient {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(Self {
            config: config.clone(),
            session: Session::new(config)?,
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Performs one fetch attempt bounded by the watchdog
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Page))` - The source answered with a success status
    /// * `Ok(None)` - The source answered with any other status
    /// * `Err(FetchError::Watchdog)` - The attempt did not finish in time
    /// * `Err(FetchError::Transport)` - The request failed below HTTP
    pub async fn fetch(&self, search: &str, edition_id: &str) -> Result<Option<Page>, FetchError> {
        let watchdog = self.config.watchdog_timeout();
        match tokio::time::timeout(watchdog, self.attempt(search, edition_id)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Watchdog(watchdog)),
        }
    }

    async fn attempt(&self, search: &str, edition_id: &str) -> Result<Option<Page>, FetchError> {
        let response = self
            .session
            .get(
                &self.config.base_url,
                &[("search", search), ("version", edition_id)],
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("'{}' ({}) answered HTTP {}", search, edition_id, status.as_u16());
            return Ok(None);
        }

        let body = response.text().await?;
        Ok(Some(Page { body }))
    }

    /// Fetches a work item until it succeeds or the policy is spent
    ///
    /// | Outcome of an attempt | Next step |
    /// |-----------------------|-----------|
    /// | Watchdog expired | Retry on the same session |
    /// | Transport error | Build a fresh session, then retry |
    /// | Non-success status | Retry on the same session |
    ///
    /// The same work item is retried in place; it never goes back on the
    /// queue.
    pub async fn fetch_with_retry(&mut self, item: &WorkItem) -> Result<Page, FetchError> {
        let search = item.search_term();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.fetch(&search, &item.edition_id).await {
                Ok(Some(page)) => return Ok(page),
                Ok(None) => {
                    tracing::debug!("{}: no document on attempt {}", item, attempt);
                }
                Err(FetchError::Watchdog(limit)) => {
                    tracing::debug!("{}: watchdog expired after {:?} on attempt {}", item, limit, attempt);
                }
                Err(e) => {
                    tracing::debug!("{}: {} on attempt {}, renewing session", item, e, attempt);
                    self.session = Session::new(&self.config)?;
                }
            }

            if !self.policy.allows_retry(attempt) {
                return Err(FetchError::Exhausted {
                    search,
                    attempts: attempt,
                });
            }

            if !self.policy.backoff.is_zero() {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }
    }
}
