//! Pluggable stage capabilities
//!
//! The pipeline never fetches, parses or stores anything itself. Each stage
//! delegates to one of the traits defined here:
//! - [`Fetcher`] turns a URL into opaque content
//! - [`Parser`] turns content into follow-up links and records
//! - [`Saver`] persists records and closes its output at the end of a run
//!
//! Per-task faults are reported through the outcome types, never as errors,
//! so a single bad page cannot stop a worker.

mod fetcher;
mod parser;

pub use fetcher::{build_http_client, HttpFetcher, Page};
pub use parser::{parse_html, HtmlParser, PageRecord, ParsedPage};

use crate::output::OutputResult;
use async_trait::async_trait;

/// Result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<C> {
    /// The URL was fetched; the content moves on to the parse stage
    Success(C),

    /// A transient fault; the task should be queued again
    RetryNeeded,

    /// The URL cannot be fetched; the task is dropped
    PermanentFailure,
}

/// A link found while parsing, ready to become a fetch task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink<K> {
    pub url: String,
    pub keys: K,

    /// Queue priority the parser assigns to the link
    pub priority: u32,
}

/// Result of parsing one page
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<K, R> {
    Success {
        links: Vec<DiscoveredLink<K>>,
        records: Vec<R>,
    },
    Failure,
}

impl<K, R> ParseOutcome<K, R> {
    /// A successful parse that produced nothing
    pub fn empty() -> Self {
        ParseOutcome::Success {
            links: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// Fetch capability
///
/// Implementations must map every internal fault to `RetryNeeded` or
/// `PermanentFailure`, and should give up once `repeat_count` reaches their
/// own retry ceiling.
#[async_trait]
pub trait Fetcher<K, C>: Send + Sync {
    async fn fetch(&self, url: &str, keys: &K, repeat_count: u32) -> FetchOutcome<C>;
}

/// Parse capability
///
/// Implementations bound by a maximum depth must return no links once
/// `depth` reaches it; record extraction is unaffected by depth.
#[async_trait]
pub trait Parser<K, C, R>: Send + Sync {
    async fn parse(
        &self,
        priority: u32,
        url: &str,
        keys: &K,
        depth: u32,
        content: &C,
    ) -> ParseOutcome<K, R>;
}

/// Save capability
///
/// Owns its output target entirely. The return value of [`Saver::save`] is
/// only used for bookkeeping.
#[async_trait]
pub trait Saver<K, R>: Send + Sync {
    /// Persists one record, returning whether it was written
    async fn save(&self, url: &str, keys: &K, record: &R) -> bool;

    /// Closes the output target
    ///
    /// Called exactly once per run, after the last save worker has exited,
    /// even when nothing was saved.
    async fn finalize(&self) -> OutputResult<()> {
        Ok(())
    }
}
