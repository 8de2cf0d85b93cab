use crate::crawler::filter::{DEFAULT_ALLOW_PATTERN, DEFAULT_DENY_PATTERN};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Tide-Crawl
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub fetcher: FetcherConfig,
    pub parser: ParserConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    pub seed: Option<SeedConfig>,
}

/// Worker pool sizes and queue timing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of concurrent fetch workers
    #[serde(rename = "fetch-workers")]
    pub fetch_workers: usize,

    /// Number of parse workers
    #[serde(rename = "parse-workers")]
    pub parse_workers: usize,

    /// Number of save workers
    #[serde(rename = "save-workers")]
    pub save_workers: usize,

    /// How long an idle worker waits on its queue before checking for
    /// quiescence (milliseconds)
    #[serde(rename = "queue-wait-ms")]
    pub queue_wait_ms: u64,
}

impl PipelineConfig {
    /// Returns the queue wait as a duration
    pub fn queue_wait(&self) -> Duration {
        Duration::from_millis(self.queue_wait_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_workers: 10,
            parse_workers: 1,
            save_workers: 1,
            queue_wait_ms: 5000,
        }
    }
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Retries allowed for transient failures before giving up
    #[serde(rename = "max-repeat")]
    pub max_repeat: u32,

    /// Upper bound of the random delay before each request (milliseconds)
    #[serde(rename = "sleep-time-ms")]
    pub sleep_time_ms: u64,

    #[serde(rename = "connect-timeout-ms")]
    pub connect_timeout_ms: u64,

    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// User agents to pick from at random; empty uses the built-in one
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_repeat: 3,
            sleep_time_ms: 0,
            connect_timeout_ms: 3050,
            request_timeout_ms: 10_000,
            user_agents: Vec::new(),
        }
    }
}

/// HTML parsing behavior
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum link depth to follow; absent means unlimited
    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,
}

/// Admission filter patterns and duplicate tracking
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Case-insensitive patterns that reject a URL
    pub deny: Vec<String>,

    /// Case-insensitive patterns of which one must match
    pub allow: Vec<String>,

    /// Expected URL count for a Bloom filter; absent uses an exact set
    #[serde(rename = "bloom-capacity")]
    pub bloom_capacity: Option<usize>,

    /// Bloom filter false-positive rate
    #[serde(rename = "bloom-error-rate")]
    pub bloom_error_rate: f64,

    /// URLs treated as already admitted, e.g. from an earlier run
    #[serde(rename = "known-urls")]
    pub known_urls: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            deny: vec![DEFAULT_DENY_PATTERN.to_string()],
            allow: vec![DEFAULT_ALLOW_PATTERN.to_string()],
            bloom_capacity: None,
            bloom_error_rate: 0.001,
            known_urls: Vec::new(),
        }
    }
}

/// Where saved records go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// A single JSON document
    Json,
    /// Tab-separated lines
    Text,
    /// A SQLite database
    Sqlite,
}

impl OutputFormat {
    /// Output file used when none is configured; `None` means stdout
    pub fn default_path(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Json => Some("crawl_result.json"),
            OutputFormat::Text => None,
            OutputFormat::Sqlite => Some("crawl_result.db"),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,

    /// Target file; for `text` an absent path means stdout
    pub path: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            path: OutputFormat::Json.default_path().map(str::to_string),
        }
    }
}

/// The task the crawl starts from
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub url: String,

    /// Arbitrary payload carried to every task of this crawl
    #[serde(default)]
    pub keys: serde_json::Value,

    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub depth: u32,
}

impl SeedConfig {
    /// Creates a seed with no keys at priority 0, depth 0
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            keys: serde_json::Value::Null,
            priority: 0,
            depth: 0,
        }
    }
}
