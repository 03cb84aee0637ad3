//! Harvester module for fetching and processing chapters
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with a watchdog and session renewal
//! - Passage extraction and text flattening
//! - The work queue and its completion barrier
//! - Overall harvest coordination with a fixed worker pool

mod coordinator;
mod extract;
mod fetcher;
mod queue;

pub use coordinator::{harvest_unit, Harvester, UnitPlan, UnitReport};
pub use extract::{collapse_whitespace, extract_passage, to_ascii, Passage, PassageContent};
pub use fetcher::{FetchClient, Page, RetryPolicy, Session};
pub use queue::{next_job, CompletionBarrier, Job, SharedReceiver, Ticket, WorkQueue};
