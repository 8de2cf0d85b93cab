//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the run lifecycle:
//! - Building a fresh pipeline for every run
//! - Seeding the fetch queue
//! - Starting and joining the worker pools
//! - Draining leftover fetch work
//! - Finalizing the output exactly once

use crate::capability::{Fetcher, HtmlParser, HttpFetcher, Page, PageRecord, Parser, Saver};
use crate::config::{Config, FilterConfig, PipelineConfig, SeedConfig};
use crate::crawler::filter::AdmissionFilter;
use crate::crawler::pipeline::Pipeline;
use crate::crawler::task::{FetchTask, Task};
use crate::crawler::worker::{run_worker, Capability};
use crate::output::{open_saver, RunReport};
use crate::url::normalize_url;
use crate::CrawlError;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Where fetch workers get their fetch capability from
enum FetcherPool<K, C> {
    /// One instance shared by `fetch-workers` workers
    Shared(Arc<dyn Fetcher<K, C>>),

    /// One worker per instance
    PerWorker(Vec<Arc<dyn Fetcher<K, C>>>),
}

/// Owns the capabilities and settings for running crawls
pub struct Coordinator<K, C, R> {
    pipeline_config: PipelineConfig,
    filter_config: FilterConfig,
    fetchers: FetcherPool<K, C>,
    parser: Arc<dyn Parser<K, C, R>>,
    saver: Arc<dyn Saver<K, R>>,
}

impl<K, C, R> Coordinator<K, C, R>
where
    K: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `pipeline_config` - Worker counts and queue wait
    /// * `filter_config` - Admission patterns and duplicate tracking
    /// * `fetcher` - Fetch capability shared by all fetch workers
    /// * `parser` - Parse capability
    /// * `saver` - Save capability, finalized once per run
    pub fn new(
        pipeline_config: PipelineConfig,
        filter_config: FilterConfig,
        fetcher: Arc<dyn Fetcher<K, C>>,
        parser: Arc<dyn Parser<K, C, R>>,
        saver: Arc<dyn Saver<K, R>>,
    ) -> Self {
        Self {
            pipeline_config,
            filter_config,
            fetchers: FetcherPool::Shared(fetcher),
            parser,
            saver,
        }
    }

    /// Creates a coordinator with one fetch worker per fetcher
    ///
    /// Lets each worker carry its own client, proxy or user agent. The
    /// number of fetchers replaces `fetch-workers` from the pipeline
    /// configuration.
    ///
    /// # Arguments
    ///
    /// * `pipeline_config` - Parse/save worker counts and queue wait
    /// * `filter_config` - Admission patterns and duplicate tracking
    /// * `fetchers` - One fetch capability per fetch worker
    /// * `parser` - Parse capability
    /// * `saver` - Save capability, finalized once per run
    pub fn with_fetchers(
        pipeline_config: PipelineConfig,
        filter_config: FilterConfig,
        fetchers: Vec<Arc<dyn Fetcher<K, C>>>,
        parser: Arc<dyn Parser<K, C, R>>,
        saver: Arc<dyn Saver<K, R>>,
    ) -> Self {
        if fetchers.is_empty() {
            tracing::warn!("Coordinator created without fetchers; seeds will be drained unfetched");
        }
        Self {
            pipeline_config,
            filter_config,
            fetchers: FetcherPool::PerWorker(fetchers),
            parser,
            saver,
        }
    }

    /// Number of fetch workers each run starts
    pub fn fetch_worker_count(&self) -> usize {
        match &self.fetchers {
            FetcherPool::Shared(_) => self.pipeline_config.fetch_workers,
            FetcherPool::PerWorker(fetchers) => fetchers.len(),
        }
    }

    /// Crawls from a seed task until the pipeline is quiescent
    ///
    /// Each call builds its own queues, counters and admission filter. The
    /// saver is shared across calls and finalized at the end of each one, so
    /// running a coordinator again needs a saver that accepts records after
    /// `finalize`. The built-in output savers do not; `run_crawl` opens a
    /// fresh one per call.
    ///
    /// # Arguments
    ///
    /// * `seed` - The first fetch task
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - The run ended; the report says what happened
    /// * `Err(CrawlError)` - The admission filter could not be built
    pub async fn run(&self, seed: FetchTask<K>) -> Result<RunReport, CrawlError> {
        let filter = AdmissionFilter::from_config(&self.filter_config)?;
        let pipeline = Arc::new(Pipeline::new(filter, self.pipeline_config.queue_wait()));
        let start_time = Instant::now();

        let seed_url = seed.url.clone();
        if pipeline.add_task(Task::Fetch(seed)) {
            tracing::info!("Starting crawl from {}", seed_url);
        } else {
            tracing::warn!("Seed {} was rejected by the admission filter", seed_url);
        }

        let fetch_capabilities: Vec<_> = match &self.fetchers {
            FetcherPool::Shared(fetcher) => (0..self.pipeline_config.fetch_workers)
                .map(|_| Capability::Fetch(Arc::clone(fetcher)))
                .collect(),
            FetcherPool::PerWorker(fetchers) => fetchers
                .iter()
                .map(|fetcher| Capability::Fetch(Arc::clone(fetcher)))
                .collect(),
        };
        let fetch_workers = spawn_workers(&pipeline, fetch_capabilities);
        let parse_workers = spawn_workers(
            &pipeline,
            (0..self.pipeline_config.parse_workers)
                .map(|_| Capability::Parse(Arc::clone(&self.parser)))
                .collect(),
        );
        let save_workers = spawn_workers(
            &pipeline,
            (0..self.pipeline_config.save_workers)
                .map(|_| Capability::Save(Arc::clone(&self.saver)))
                .collect(),
        );

        join_workers(fetch_workers).await;

        let drained_fetch = pipeline.drain_fetch();
        if drained_fetch > 0 {
            tracing::warn!(
                "Drained {} fetch tasks left after the fetch workers exited",
                drained_fetch
            );
        }

        join_workers(parse_workers).await;
        join_workers(save_workers).await;

        let finalized = match self.saver.finalize().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to finalize output: {}", e);
                false
            }
        };

        let report = RunReport {
            stats: pipeline.stats().snapshot(),
            elapsed: start_time.elapsed(),
            drained_fetch,
            finalized,
            quiescent: pipeline.all_tasks_done(),
        };

        tracing::info!(
            "Crawl complete: {} fetched, {} parsed, {} saved in {:.2}s",
            report.stats.fetched,
            report.stats.parsed,
            report.stats.saved,
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

}

/// Starts one worker task per capability
fn spawn_workers<K, C, R>(
    pipeline: &Arc<Pipeline<K, C, R>>,
    capabilities: Vec<Capability<K, C, R>>,
) -> Vec<JoinHandle<u64>>
where
    K: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    capabilities
        .into_iter()
        .enumerate()
        .map(|(i, capability)| {
            let name = format!("{}-worker-{}", capability.stage(), i);
            tokio::spawn(run_worker(name, Arc::clone(pipeline), capability))
        })
        .collect()
}

async fn join_workers(handles: Vec<JoinHandle<u64>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Worker task failed: {}", e);
        }
    }
}

/// Runs a complete crawl with the built-in HTTP fetcher, HTML parser and the
/// configured output
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `seed` - Where the crawl starts
/// * `config_hash` - Hash of the configuration, stored by the SQLite output
///
/// # Returns
///
/// * `Ok(RunReport)` - Crawl completed
/// * `Err(CrawlError)` - Setup failed (bad seed, HTTP client, output target)
pub async fn run_crawl(
    config: &Config,
    seed: &SeedConfig,
    config_hash: &str,
) -> Result<RunReport, CrawlError> {
    let seed_url = normalize_url(&seed.url)?;

    let fetcher: Arc<dyn Fetcher<serde_json::Value, Page>> =
        Arc::new(HttpFetcher::new(&config.fetcher)?);
    let parser: Arc<dyn Parser<serde_json::Value, Page, PageRecord>> =
        Arc::new(HtmlParser::new(config.parser.max_depth));
    let saver = open_saver::<serde_json::Value>(&config.output, config_hash)?;

    let coordinator = Coordinator::new(
        config.pipeline.clone(),
        config.filter.clone(),
        fetcher,
        parser,
        saver,
    );

    let task = FetchTask::new(seed_url.as_str(), seed.keys.clone())
        .with_priority(seed.priority)
        .with_depth(seed.depth);

    coordinator.run(task).await
}
