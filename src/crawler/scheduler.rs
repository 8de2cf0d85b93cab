//! Stage queues for the fetch, parse and save stages
//!
//! This module handles:
//! - Priority ordering for fetch and parse work (lower priority values first)
//! - Plain FIFO ordering for save work
//! - Keeping each stage's pending counter in step with its queue
//! - Bounded waiting, so an idle worker wakes up to check for quiescence

use crate::crawler::counters::SharedCounters;
use crate::crawler::task::Stage;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Storage discipline behind a stage queue
pub trait TaskBuffer: Send {
    /// The kind of task this buffer holds
    type Item: Send;

    fn push(&mut self, item: Self::Item);

    fn pop(&mut self) -> Option<Self::Item>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serves the greatest item first according to its `Ord` implementation
#[derive(Debug)]
pub struct PriorityBuffer<T: Ord> {
    heap: BinaryHeap<T>,
}

impl<T: Ord> Default for PriorityBuffer<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<T: Ord + Send> TaskBuffer for PriorityBuffer<T> {
    type Item = T;

    fn push(&mut self, item: T) {
        self.heap.push(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.heap.pop()
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Serves items in arrival order
#[derive(Debug)]
pub struct FifoBuffer<T> {
    items: VecDeque<T>,
}

impl<T> Default for FifoBuffer<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T: Send> TaskBuffer for FifoBuffer<T> {
    type Item = T;

    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A queue bound to one stage and to the shared counters
///
/// Every push and pop updates the stage's pending counter while the buffer
/// lock is still held, so the counter never disagrees with the buffer.
pub struct StageQueue<B: TaskBuffer> {
    stage: Stage,
    buffer: Mutex<B>,
    available: Notify,
}

impl<B: TaskBuffer + Default> StageQueue<B> {
    /// Creates an empty queue for the given stage
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            buffer: Mutex::new(B::default()),
            available: Notify::new(),
        }
    }
}

impl<B: TaskBuffer> StageQueue<B> {
    fn lock(&self) -> MutexGuard<'_, B> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the stage this queue serves
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Adds a task and wakes one waiting worker
    pub fn push(&self, item: B::Item, counters: &SharedCounters) {
        {
            let mut buffer = self.lock();
            buffer.push(item);
            counters.enqueued(self.stage);
        }
        self.available.notify_one();
    }

    /// Removes the next task without waiting
    ///
    /// On success the task is counted as running.
    pub fn try_pop(&self, counters: &SharedCounters) -> Option<B::Item> {
        let mut buffer = self.lock();
        let item = buffer.pop()?;
        counters.dequeued(self.stage);
        Some(item)
    }

    /// Removes the next task, waiting at most `wait` for one to arrive
    ///
    /// # Returns
    ///
    /// * `Some(task)` - A task, now counted as running
    /// * `None` - The wait elapsed with the queue still empty
    pub async fn pop(&self, wait: Duration, counters: &SharedCounters) -> Option<B::Item> {
        let deadline = Instant::now() + wait;

        loop {
            // Created before the check so a push racing with it leaves a permit behind
            let notified = self.available.notified();

            if let Some(item) = self.try_pop(counters) {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::trace!("{} queue empty after {:?}", self.stage, wait);
                return None;
            }
        }
    }

    /// Returns the number of queued tasks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::task::FetchTask;
    use std::sync::Arc;

    fn fetch(priority: u32, url: &str) -> FetchTask<()> {
        FetchTask::new(url, ()).with_priority(priority)
    }

    #[test]
    fn test_new_queue_is_empty() {
        let queue: StageQueue<FifoBuffer<u32>> = StageQueue::new(Stage::Save);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.stage(), Stage::Save);
    }

    #[test]
    fn test_push_updates_pending_counter() {
        let counters = SharedCounters::new();
        let queue: StageQueue<PriorityBuffer<FetchTask<()>>> = StageQueue::new(Stage::Fetch);

        queue.push(fetch(0, "https://a.com"), &counters);
        queue.push(fetch(0, "https://b.com"), &counters);

        assert_eq!(queue.len(), 2);
        assert_eq!(counters.snapshot().pending_fetch, 2);
    }

    #[test]
    fn test_try_pop_moves_task_to_running() {
        let counters = SharedCounters::new();
        let queue: StageQueue<PriorityBuffer<FetchTask<()>>> = StageQueue::new(Stage::Fetch);
        queue.push(fetch(0, "https://a.com"), &counters);

        let task = queue.try_pop(&counters);
        assert!(task.is_some());

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.pending_fetch, 0);
        assert_eq!(snapshot.running, 1);
    }

    #[test]
    fn test_try_pop_empty_leaves_counters_alone() {
        let counters = SharedCounters::new();
        let queue: StageQueue<FifoBuffer<u32>> = StageQueue::new(Stage::Save);

        assert!(queue.try_pop(&counters).is_none());
        assert_eq!(counters.snapshot(), Default::default());
    }

    #[test]
    fn test_priority_order() {
        let counters = SharedCounters::new();
        let queue: StageQueue<PriorityBuffer<FetchTask<()>>> = StageQueue::new(Stage::Fetch);

        queue.push(fetch(2, "https://c.com"), &counters);
        queue.push(fetch(0, "https://a.com"), &counters);
        queue.push(fetch(1, "https://b.com"), &counters);

        let order: Vec<u32> = std::iter::from_fn(|| queue.try_pop(&counters))
            .map(|task| task.priority)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_fifo_order() {
        let counters = SharedCounters::new();
        let queue: StageQueue<FifoBuffer<&str>> = StageQueue::new(Stage::Save);

        for item in ["first", "second", "third"] {
            queue.push(item, &counters);
        }

        let order: Vec<&str> = std::iter::from_fn(|| queue.try_pop(&counters)).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let counters = SharedCounters::new();
        let queue: StageQueue<FifoBuffer<u32>> = StageQueue::new(Stage::Save);

        let started = std::time::Instant::now();
        let item = queue.pop(Duration::from_millis(30), &counters).await;

        assert!(item.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
        assert_eq!(counters.snapshot().running, 0);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let counters = Arc::new(SharedCounters::new());
        let queue: Arc<StageQueue<FifoBuffer<u32>>> = Arc::new(StageQueue::new(Stage::Save));

        let waiter = {
            let queue = queue.clone();
            let counters = counters.clone();
            tokio::spawn(async move { queue.pop(Duration::from_secs(5), &counters).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(7, &counters);

        let item = waiter.await.unwrap();
        assert_eq!(item, Some(7));
        assert_eq!(counters.snapshot().running, 1);
    }
}
