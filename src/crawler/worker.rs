//! The worker execution loop
//!
//! Every worker runs the same loop: take a task from its stage, hand it to
//! the stage's capability, queue whatever follow-up work the result calls
//! for, then mark the task finished. A worker only stops after an empty wait
//! on its queue coincides with global quiescence.

use crate::capability::{FetchOutcome, Fetcher, ParseOutcome, Parser, Saver};
use crate::crawler::pipeline::Pipeline;
use crate::crawler::task::{FetchTask, ParseTask, SaveTask, Stage, Task};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// The stage-specific behavior plugged into a worker
pub enum Capability<K, C, R> {
    Fetch(Arc<dyn Fetcher<K, C>>),
    Parse(Arc<dyn Parser<K, C, R>>),
    Save(Arc<dyn Saver<K, R>>),
}

impl<K, C, R> Capability<K, C, R> {
    /// The stage this capability serves
    pub fn stage(&self) -> Stage {
        match self {
            Capability::Fetch(_) => Stage::Fetch,
            Capability::Parse(_) => Stage::Parse,
            Capability::Save(_) => Stage::Save,
        }
    }
}

impl<K, C, R> Clone for Capability<K, C, R> {
    fn clone(&self) -> Self {
        match self {
            Capability::Fetch(fetcher) => Capability::Fetch(Arc::clone(fetcher)),
            Capability::Parse(parser) => Capability::Parse(Arc::clone(parser)),
            Capability::Save(saver) => Capability::Save(Arc::clone(saver)),
        }
    }
}

/// Runs one worker until the pipeline is quiescent
///
/// # Arguments
///
/// * `name` - Used in log messages
/// * `pipeline` - The run's shared pipeline
/// * `capability` - Decides which stage the worker serves
///
/// # Returns
///
/// The number of tasks this worker handled
pub async fn run_worker<K, C, R>(
    name: String,
    pipeline: Arc<Pipeline<K, C, R>>,
    capability: Capability<K, C, R>,
) -> u64
where
    K: Clone + Send + Sync,
    C: Send + Sync,
    R: Send + Sync,
{
    let stage = capability.stage();
    tracing::debug!("{} started", name);

    let mut handled = 0;
    loop {
        match pipeline.get_task(stage).await {
            Some(task) => {
                handle_task(&pipeline, &capability, task).await;
                pipeline.finish_task(stage);
                handled += 1;
            }
            None => {
                if pipeline.all_tasks_done() {
                    break;
                }
            }
        }
    }

    tracing::debug!("{} finished after {} tasks", name, handled);
    handled
}

async fn handle_task<K, C, R>(
    pipeline: &Pipeline<K, C, R>,
    capability: &Capability<K, C, R>,
    task: Task<K, C, R>,
) where
    K: Clone + Send + Sync,
    C: Send + Sync,
    R: Send + Sync,
{
    match (capability, task) {
        (Capability::Fetch(fetcher), Task::Fetch(task)) => {
            fetch_one(pipeline, fetcher.as_ref(), task).await
        }
        (Capability::Parse(parser), Task::Parse(task)) => {
            parse_one(pipeline, parser.as_ref(), task).await
        }
        (Capability::Save(saver), Task::Save(task)) => save_one(pipeline, saver.as_ref(), task).await,
        (capability, task) => {
            tracing::error!(
                "{} worker received a {} task for {}",
                capability.stage(),
                task.stage(),
                task.url()
            );
        }
    }
}

async fn fetch_one<K, C, R>(
    pipeline: &Pipeline<K, C, R>,
    fetcher: &dyn Fetcher<K, C>,
    task: FetchTask<K>,
) where
    K: Send + Sync,
    C: Send,
    R: Send,
{
    let outcome = AssertUnwindSafe(fetcher.fetch(&task.url, &task.keys, task.repeat_count))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Fetcher panicked on {}", task.url);
            FetchOutcome::PermanentFailure
        });

    match outcome {
        FetchOutcome::Success(content) => {
            pipeline.stats().record_fetched();
            pipeline.add_task(Task::Parse(ParseTask {
                priority: task.priority,
                url: task.url,
                keys: task.keys,
                depth: task.depth,
                content,
            }));
        }
        FetchOutcome::RetryNeeded => pipeline.requeue_fetch(task.retried()),
        FetchOutcome::PermanentFailure => {
            tracing::warn!(
                "Giving up on {} after {} retries",
                task.url,
                task.repeat_count
            );
            pipeline.stats().record_fetch_failure();
        }
    }
}

async fn parse_one<K, C, R>(
    pipeline: &Pipeline<K, C, R>,
    parser: &dyn Parser<K, C, R>,
    task: ParseTask<K, C>,
) where
    K: Clone + Send + Sync,
    C: Send + Sync,
    R: Send,
{
    let outcome = AssertUnwindSafe(parser.parse(
        task.priority,
        &task.url,
        &task.keys,
        task.depth,
        &task.content,
    ))
    .catch_unwind()
    .await
    .unwrap_or_else(|_| {
        tracing::error!("Parser panicked on {}", task.url);
        ParseOutcome::Failure
    });

    match outcome {
        ParseOutcome::Success { links, records } => {
            pipeline.stats().record_parsed(links.len(), records.len());
            tracing::debug!(
                "Parsed {}: {} links, {} records",
                task.url,
                links.len(),
                records.len()
            );

            let depth = task.depth.saturating_add(1);
            for link in links {
                pipeline.add_task(Task::Fetch(FetchTask {
                    priority: link.priority,
                    url: link.url,
                    keys: link.keys,
                    depth,
                    repeat_count: 0,
                }));
            }

            for record in records {
                pipeline.add_task(Task::Save(SaveTask {
                    url: task.url.clone(),
                    keys: task.keys.clone(),
                    record,
                }));
            }
        }
        ParseOutcome::Failure => {
            tracing::debug!("Failed to parse {}", task.url);
            pipeline.stats().record_parse_failure();
        }
    }
}

async fn save_one<K, C, R>(pipeline: &Pipeline<K, C, R>, saver: &dyn Saver<K, R>, task: SaveTask<K, R>)
where
    K: Send + Sync,
    C: Send,
    R: Send + Sync,
{
    let saved = AssertUnwindSafe(saver.save(&task.url, &task.keys, &task.record))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            tracing::error!("Saver panicked on {}", task.url);
            false
        });

    if !saved {
        tracing::warn!("Record from {} was not saved", task.url);
    }
    pipeline.stats().record_save(saved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DiscoveredLink;
    use crate::crawler::filter::{AdmissionFilter, Membership};
    use async_trait::async_trait;
    use std::time::Duration;

    struct LinkParser;

    #[async_trait]
    impl Parser<(), String, String> for LinkParser {
        async fn parse(
            &self,
            _priority: u32,
            url: &str,
            _keys: &(),
            depth: u32,
            content: &String,
        ) -> ParseOutcome<(), String> {
            ParseOutcome::Success {
                links: vec![
                    DiscoveredLink {
                        url: format!("{}a", url),
                        keys: (),
                        priority: depth + 1,
                    },
                    DiscoveredLink {
                        url: format!("{}b", url),
                        keys: (),
                        priority: depth + 1,
                    },
                ],
                records: vec![content.clone()],
            }
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher<(), String> for PanickingFetcher {
        async fn fetch(&self, _url: &str, _keys: &(), _repeat_count: u32) -> FetchOutcome<String> {
            panic!("fetcher blew up");
        }
    }

    fn pipeline() -> Pipeline<(), String, String> {
        let filter = AdmissionFilter::new::<&str>(&[], &["^http"], Membership::exact()).unwrap();
        Pipeline::new(filter, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_parse_fans_out_links_and_records() {
        let pipeline = pipeline();
        pipeline.add_task(Task::Parse(ParseTask {
            priority: 0,
            url: "http://x/".to_string(),
            keys: (),
            depth: 0,
            content: "title".to_string(),
        }));

        let task = pipeline.get_task(Stage::Parse).await.unwrap();
        let before = pipeline.snapshot();
        handle_task(&pipeline, &Capability::Parse(Arc::new(LinkParser)), task).await;
        pipeline.finish_task(Stage::Parse);

        let after = pipeline.snapshot();
        assert_eq!(before.running, 1);
        assert_eq!(after.running, 0);
        assert_eq!(after.pending_parse, 0);
        assert_eq!(after.pending_fetch, 2);
        assert_eq!(after.pending_save, 1);

        let Some(Task::Fetch(link)) = pipeline.get_task(Stage::Fetch).await else {
            panic!("expected a fetch task");
        };
        assert_eq!(link.url, "http://x/a");
        assert_eq!(link.depth, 1);
        assert_eq!(link.priority, 1);
        assert_eq!(link.repeat_count, 0);
    }

    #[tokio::test]
    async fn test_fetch_panic_drops_task() {
        let pipeline = Arc::new(pipeline());
        pipeline.add_task(Task::Fetch(FetchTask::new("http://x/", ())));

        let handled = run_worker(
            "fetch-test".to_string(),
            Arc::clone(&pipeline),
            Capability::Fetch(Arc::new(PanickingFetcher)),
        )
        .await;

        assert_eq!(handled, 1);
        assert!(pipeline.all_tasks_done());
        assert_eq!(pipeline.stats().snapshot().fetch_failures, 1);
    }

    #[test]
    fn test_capability_stage() {
        let capability: Capability<(), String, String> = Capability::Parse(Arc::new(LinkParser));
        assert_eq!(capability.stage(), Stage::Parse);
        assert_eq!(capability.clone().stage(), Stage::Parse);
    }
}
