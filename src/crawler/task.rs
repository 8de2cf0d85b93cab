//! Task and stage definitions
//!
//! A task is one unit of work sitting in (or taken from) a stage queue. The
//! `keys`, `content` and `record` payloads are carried through the pipeline
//! untouched; only `priority` and `url` take part in queue ordering.

use std::cmp::Ordering;
use std::fmt;

/// The three phases a piece of work moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Parse,
    Save,
}

impl Stage {
    /// All stages, in pipeline order
    pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Parse, Stage::Save];

    /// Returns the lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Save => "save",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orders by ascending priority, then ascending URL.
///
/// `BinaryHeap` is a max-heap, so the comparison is reversed: the task that
/// should be served first compares as the greatest.
fn queue_order(a_priority: u32, a_url: &str, b_priority: u32, b_url: &str) -> Ordering {
    b_priority
        .cmp(&a_priority)
        .then_with(|| b_url.cmp(a_url))
}

/// A URL waiting to be fetched
#[derive(Debug, Clone)]
pub struct FetchTask<K> {
    /// Queue priority (lower values are served first)
    pub priority: u32,

    /// The URL to fetch
    pub url: String,

    /// Caller payload carried through the whole crawl of one seed
    pub keys: K,

    /// Link distance from the seed
    pub depth: u32,

    /// How many times this URL has already been retried
    pub repeat_count: u32,
}

impl<K> FetchTask<K> {
    /// Creates a seed-level task (priority 0, depth 0, no retries)
    pub fn new(url: impl Into<String>, keys: K) -> Self {
        Self {
            priority: 0,
            url: url.into(),
            keys,
            depth: 0,
            repeat_count: 0,
        }
    }

    /// Sets the queue priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the crawl depth
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Returns the task as it re-enters the queue after a transient failure
    ///
    /// The priority is bumped so the retry lands behind its siblings of the
    /// same band.
    pub fn retried(self) -> Self {
        Self {
            priority: self.priority.saturating_add(1),
            repeat_count: self.repeat_count.saturating_add(1),
            ..self
        }
    }
}

impl<K> Ord for FetchTask<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        queue_order(self.priority, &self.url, other.priority, &other.url)
    }
}

impl<K> PartialOrd for FetchTask<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> PartialEq for FetchTask<K> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.url == other.url
    }
}

impl<K> Eq for FetchTask<K> {}

/// A fetched page waiting to be parsed
#[derive(Debug, Clone)]
pub struct ParseTask<K, C> {
    pub priority: u32,
    pub url: String,
    pub keys: K,
    pub depth: u32,

    /// Whatever the fetch capability produced for this URL
    pub content: C,
}

impl<K, C> Ord for ParseTask<K, C> {
    fn cmp(&self, other: &Self) -> Ordering {
        queue_order(self.priority, &self.url, other.priority, &other.url)
    }
}

impl<K, C> PartialOrd for ParseTask<K, C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, C> PartialEq for ParseTask<K, C> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.url == other.url
    }
}

impl<K, C> Eq for ParseTask<K, C> {}

/// An extracted record waiting to be persisted
#[derive(Debug, Clone)]
pub struct SaveTask<K, R> {
    /// The page the record was extracted from
    pub url: String,
    pub keys: K,
    pub record: R,
}

/// Any task, tagged with the stage it belongs to
#[derive(Debug, Clone)]
pub enum Task<K, C, R> {
    Fetch(FetchTask<K>),
    Parse(ParseTask<K, C>),
    Save(SaveTask<K, R>),
}

impl<K, C, R> Task<K, C, R> {
    /// Returns the stage whose queue this task belongs in
    pub fn stage(&self) -> Stage {
        match self {
            Task::Fetch(_) => Stage::Fetch,
            Task::Parse(_) => Stage::Parse,
            Task::Save(_) => Stage::Save,
        }
    }

    /// Returns the URL the task concerns
    pub fn url(&self) -> &str {
        match self {
            Task::Fetch(task) => &task.url,
            Task::Parse(task) => &task.url,
            Task::Save(task) => &task.url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn fetch(priority: u32, url: &str) -> FetchTask<()> {
        FetchTask::new(url, ()).with_priority(priority)
    }

    #[test]
    fn test_lower_priority_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(fetch(2, "https://c.com"));
        heap.push(fetch(0, "https://a.com"));
        heap.push(fetch(1, "https://b.com"));

        let order: Vec<u32> = std::iter::from_fn(|| heap.pop()).map(|t| t.priority).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_equal_priority_breaks_ties_by_url() {
        let mut heap = BinaryHeap::new();
        heap.push(fetch(1, "b.com"));
        heap.push(fetch(1, "a.com"));

        assert_eq!(heap.pop().unwrap().url, "a.com");
        assert_eq!(heap.pop().unwrap().url, "b.com");
    }

    #[test]
    fn test_keys_do_not_affect_equality() {
        let a = FetchTask::new("https://a.com", 1).with_priority(3);
        let b = FetchTask::new("https://a.com", 2).with_priority(3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_retried_bumps_priority_and_repeat() {
        let task = fetch(4, "https://a.com").with_depth(2).retried();
        assert_eq!(task.priority, 5);
        assert_eq!(task.repeat_count, 1);
        assert_eq!(task.depth, 2);
    }

    #[test]
    fn test_parse_task_ordering() {
        let mut heap = BinaryHeap::new();
        for (priority, url) in [(1, "z.com"), (0, "y.com"), (1, "x.com")] {
            heap.push(ParseTask {
                priority,
                url: url.to_string(),
                keys: (),
                depth: 0,
                content: (),
            });
        }

        let order: Vec<String> = std::iter::from_fn(|| heap.pop()).map(|t| t.url).collect();
        assert_eq!(order, vec!["y.com", "x.com", "z.com"]);
    }

    #[test]
    fn test_task_stage() {
        let task: Task<(), (), ()> = Task::Save(SaveTask {
            url: "https://a.com".to_string(),
            keys: (),
            record: (),
        });
        assert_eq!(task.stage(), Stage::Save);
        assert_eq!(task.url(), "https://a.com");
        assert_eq!(Stage::Parse.to_string(), "parse");
    }
}
