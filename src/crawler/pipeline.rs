//! Pipeline orchestration state
//!
//! The [`Pipeline`] owns the three stage queues, the shared counters and the
//! admission filter. Workers move work only through [`Pipeline::add_task`],
//! [`Pipeline::get_task`] and [`Pipeline::finish_task`], and stop once
//! [`Pipeline::all_tasks_done`] holds after an empty wait.

use crate::crawler::counters::{CounterSnapshot, SharedCounters};
use crate::crawler::filter::AdmissionFilter;
use crate::crawler::scheduler::{FifoBuffer, PriorityBuffer, StageQueue};
use crate::crawler::task::{FetchTask, ParseTask, SaveTask, Stage, Task};
use crate::output::CrawlStats;
use std::time::Duration;

/// Queues, counters and filter for a single run
pub struct Pipeline<K, C, R>
where
    K: Send,
    C: Send,
    R: Send,
{
    fetch_queue: StageQueue<PriorityBuffer<FetchTask<K>>>,
    parse_queue: StageQueue<PriorityBuffer<ParseTask<K, C>>>,
    save_queue: StageQueue<FifoBuffer<SaveTask<K, R>>>,
    counters: SharedCounters,
    filter: AdmissionFilter,
    stats: CrawlStats,
    queue_wait: Duration,
}

impl<K, C, R> Pipeline<K, C, R>
where
    K: Send,
    C: Send,
    R: Send,
{
    /// Creates an empty pipeline
    ///
    /// # Arguments
    ///
    /// * `filter` - Admission filter for the fetch stage, with fresh membership
    /// * `queue_wait` - How long `get_task` waits on an empty queue
    pub fn new(filter: AdmissionFilter, queue_wait: Duration) -> Self {
        Self {
            fetch_queue: StageQueue::new(Stage::Fetch),
            parse_queue: StageQueue::new(Stage::Parse),
            save_queue: StageQueue::new(Stage::Save),
            counters: SharedCounters::new(),
            filter,
            stats: CrawlStats::new(),
            queue_wait,
        }
    }

    /// Queues a task on its stage
    ///
    /// Fetch tasks must first pass the admission filter; a rejected task is
    /// dropped without touching any counter. Parse and save tasks are never
    /// filtered.
    ///
    /// # Returns
    ///
    /// `true` if the task was queued
    pub fn add_task(&self, task: Task<K, C, R>) -> bool {
        match task {
            Task::Fetch(task) => {
                let admitted = self.filter.admit(&task.url);
                self.stats.record_admission(admitted);
                if admitted {
                    self.fetch_queue.push(task, &self.counters);
                }
                admitted
            }
            Task::Parse(task) => {
                self.parse_queue.push(task, &self.counters);
                true
            }
            Task::Save(task) => {
                self.save_queue.push(task, &self.counters);
                true
            }
        }
    }

    /// Queues a fetch task again after a transient failure
    ///
    /// The URL was admitted when it first entered the pipeline, so the
    /// admission filter is not consulted again.
    pub fn requeue_fetch(&self, task: FetchTask<K>) {
        tracing::debug!(
            "Requeueing {} (attempt {}, priority {})",
            task.url,
            task.repeat_count + 1,
            task.priority
        );
        self.stats.record_fetch_retry();
        self.fetch_queue.push(task, &self.counters);
    }

    /// Takes the next task of a stage, waiting up to the queue wait
    ///
    /// # Returns
    ///
    /// * `Some(task)` - The task is now counted as running; the caller must
    ///   call [`Pipeline::finish_task`] once it has been fully handled
    /// * `None` - The queue stayed empty for the whole wait
    pub async fn get_task(&self, stage: Stage) -> Option<Task<K, C, R>> {
        match stage {
            Stage::Fetch => self
                .fetch_queue
                .pop(self.queue_wait, &self.counters)
                .await
                .map(Task::Fetch),
            Stage::Parse => self
                .parse_queue
                .pop(self.queue_wait, &self.counters)
                .await
                .map(Task::Parse),
            Stage::Save => self
                .save_queue
                .pop(self.queue_wait, &self.counters)
                .await
                .map(Task::Save),
        }
    }

    /// Takes the next task of a stage without waiting
    pub fn try_get_task(&self, stage: Stage) -> Option<Task<K, C, R>> {
        match stage {
            Stage::Fetch => self.fetch_queue.try_pop(&self.counters).map(Task::Fetch),
            Stage::Parse => self.parse_queue.try_pop(&self.counters).map(Task::Parse),
            Stage::Save => self.save_queue.try_pop(&self.counters).map(Task::Save),
        }
    }

    /// Marks a task taken from `stage` as fully handled
    ///
    /// Must be called exactly once per task returned by `get_task`, after any
    /// follow-up tasks it produced have been queued.
    pub fn finish_task(&self, stage: Stage) {
        tracing::trace!("Finished {} task", stage);
        self.counters.finished();
    }

    /// True when every queue is empty and no task is in flight
    pub fn all_tasks_done(&self) -> bool {
        self.counters.all_done()
    }

    /// Removes whatever is left in the fetch queue
    ///
    /// Runs after the fetch workers have exited. Each remaining task is taken
    /// and finished without being fetched.
    ///
    /// # Returns
    ///
    /// The number of tasks removed
    pub fn drain_fetch(&self) -> u64 {
        let mut drained = 0;
        while self.counters.snapshot().pending_fetch > 0 {
            match self.try_get_task(Stage::Fetch) {
                Some(task) => {
                    tracing::warn!("Draining unfetched task {}", task.url());
                    self.finish_task(Stage::Fetch);
                    drained += 1;
                }
                None => break,
            }
        }
        drained
    }

    /// Current counter values
    pub fn snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Run statistics collected so far
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    /// The admission filter of this run
    pub fn filter(&self) -> &AdmissionFilter {
        &self.filter
    }
}
