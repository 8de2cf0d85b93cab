//! Admission filter for the fetch stage
//!
//! A candidate URL must clear three checks before it may be queued for
//! fetching:
//! 1. It matches no deny pattern
//! 2. It matches at least one allow pattern
//! 3. It has not been admitted before during this run
//!
//! Duplicate tracking is either an exact set or a scalable Bloom filter. The
//! Bloom filter may occasionally treat a new URL as already seen, but never
//! admits a URL twice. It grows a new, larger stage each time the current one
//! fills up, so the false-positive rate stays within the configured bound no
//! matter how many URLs are admitted.

use crate::config::FilterConfig;
use crate::ConfigError;
use bloomfilter::Bloom;
use regex::{RegexSet, RegexSetBuilder};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Default deny pattern: static assets that are never worth parsing
pub const DEFAULT_DENY_PATTERN: &str = r"\.(css|js|json|xml|rss|ico|gif|jpe?g|png|svg|bmp|webp|tiff?|mp3|mp4|avi|mov|mkv|wav|flac|pdf|docx?|xlsx?|pptx?|zip|rar|7z|gz|tgz|tar|bz2|exe|msi|dmg|apk|iso|woff2?|ttf|otf|eot)(\?.*)?$";

/// Default allow pattern: anything with an http(s) scheme
pub const DEFAULT_ALLOW_PATTERN: &str = "^http";

/// How already-admitted URLs are remembered
pub enum Membership {
    /// Exact set of every admitted URL
    Exact(HashSet<String>),

    /// Scalable Bloom filter with a bounded false-positive rate
    Probabilistic(ScalableBloom),
}

impl Membership {
    /// Creates an exact membership set
    pub fn exact() -> Self {
        Membership::Exact(HashSet::new())
    }

    /// Creates a Bloom filter starting at `capacity` URLs, growing as needed
    pub fn probabilistic(capacity: usize, error_rate: f64) -> Self {
        Membership::Probabilistic(ScalableBloom::new(capacity, error_rate))
    }

    /// Inserts the URL and reports whether it was new
    fn insert(&mut self, url: &str) -> bool {
        match self {
            Membership::Exact(seen) => seen.insert(url.to_string()),
            Membership::Probabilistic(bloom) => bloom.insert(url),
        }
    }

    /// Returns the number of URLs tracked exactly, if known
    pub fn exact_len(&self) -> Option<usize> {
        match self {
            Membership::Exact(seen) => Some(seen.len()),
            Membership::Probabilistic(_) => None,
        }
    }
}

/// Each new stage holds this many times the URLs of the previous one
const GROWTH_FACTOR: usize = 2;

/// Each new stage tightens the false-positive rate by this ratio
const TIGHTENING_RATIO: f64 = 0.9;

/// One fixed-size Bloom filter and how many URLs it holds
struct BloomStage {
    bloom: Bloom<String>,
    capacity: usize,
    error_rate: f64,
    count: usize,
}

impl BloomStage {
    fn new(capacity: usize, error_rate: f64) -> Self {
        Self {
            bloom: Bloom::new_for_fp_rate(capacity, error_rate),
            capacity,
            error_rate,
            count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.count >= self.capacity
    }
}

/// A Bloom filter that adds stages as it fills
///
/// Stage `i` holds `capacity * 2^i` URLs at an error rate of
/// `error_rate * (1 - 0.9) * 0.9^i`. The per-stage rates form a geometric
/// series whose sum stays below `error_rate`, so a lookup across every stage
/// keeps the configured bound.
pub struct ScalableBloom {
    stages: Vec<BloomStage>,
    initial_capacity: usize,
    error_rate: f64,
}

impl ScalableBloom {
    /// Creates an empty filter; the first stage is allocated on first insert
    pub fn new(capacity: usize, error_rate: f64) -> Self {
        Self {
            stages: Vec::new(),
            initial_capacity: capacity.max(1),
            error_rate,
        }
    }

    /// Reports whether any stage may contain the URL
    pub fn contains(&self, url: &str) -> bool {
        let key = url.to_string();
        self.stages.iter().any(|stage| stage.bloom.check(&key))
    }

    /// Inserts the URL and reports whether it was new
    ///
    /// A URL already reported by any stage is not inserted again.
    pub fn insert(&mut self, url: &str) -> bool {
        if self.contains(url) {
            return false;
        }

        let next = match self.stages.last() {
            None => Some(BloomStage::new(
                self.initial_capacity,
                self.error_rate * (1.0 - TIGHTENING_RATIO),
            )),
            Some(last) if last.is_full() => Some(BloomStage::new(
                last.capacity.saturating_mul(GROWTH_FACTOR),
                last.error_rate * TIGHTENING_RATIO,
            )),
            Some(_) => None,
        };
        if let Some(stage) = next {
            tracing::debug!(
                "Adding Bloom filter stage {} (capacity {})",
                self.stages.len() + 1,
                stage.capacity
            );
            self.stages.push(stage);
        }

        if let Some(stage) = self.stages.last_mut() {
            stage.bloom.set(&url.to_string());
            stage.count += 1;
        }
        true
    }

    /// Number of stages allocated so far
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total URLs the allocated stages are sized for
    pub fn capacity(&self) -> usize {
        self.stages.iter().map(|stage| stage.capacity).sum()
    }
}

/// Gatekeeper consulted before a URL enters the fetch queue
pub struct AdmissionFilter {
    deny: RegexSet,
    allow: RegexSet,
    seen: Mutex<Membership>,
}

impl AdmissionFilter {
    /// Creates a filter from deny and allow patterns
    ///
    /// Patterns are case-insensitive regular expressions searched anywhere in
    /// the URL. An empty allow list admits nothing.
    ///
    /// # Arguments
    ///
    /// * `deny` - Patterns that reject a URL outright
    /// * `allow` - Patterns of which at least one must match
    /// * `membership` - The duplicate-tracking structure
    ///
    /// # Returns
    ///
    /// * `Ok(AdmissionFilter)` - All patterns compiled
    /// * `Err(ConfigError)` - A pattern is not a valid regular expression
    pub fn new<S: AsRef<str>>(
        deny: &[S],
        allow: &[S],
        membership: Membership,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            deny: compile_patterns(deny)?,
            allow: compile_patterns(allow)?,
            seen: Mutex::new(membership),
        })
    }

    /// Creates a fresh filter from configuration
    ///
    /// URLs listed under `known-urls` are preloaded as already admitted.
    pub fn from_config(config: &FilterConfig) -> Result<Self, ConfigError> {
        let membership = match config.bloom_capacity {
            Some(capacity) => Membership::probabilistic(capacity, config.bloom_error_rate),
            None => Membership::exact(),
        };
        let filter = Self::new(&config.deny, &config.allow, membership)?;

        let preloaded = filter.preload(&config.known_urls);
        if preloaded > 0 {
            tracing::info!("Preloaded {} known URLs into the admission filter", preloaded);
        }
        Ok(filter)
    }

    /// Marks URLs as already admitted without checking any pattern
    ///
    /// Used to resume a crawl without fetching pages a previous run already
    /// covered.
    ///
    /// # Returns
    ///
    /// How many of the URLs were not already known
    pub fn preload<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        urls.into_iter()
            .filter(|url| seen.insert(url.as_ref()))
            .count()
    }

    /// Decides whether a URL may enter the fetch queue
    ///
    /// The duplicate check and the insert happen under one lock, so two
    /// concurrent callers can never both admit the same URL. A URL rejected
    /// by the patterns is not recorded.
    pub fn admit(&self, url: &str) -> bool {
        if !self.passes_patterns(url) {
            tracing::trace!("Filter rejected {} by pattern", url);
            return false;
        }

        let is_new = self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url);

        if !is_new {
            tracing::trace!("Filter rejected duplicate {}", url);
        }
        is_new
    }

    /// Checks the deny and allow patterns only
    pub fn passes_patterns(&self, url: &str) -> bool {
        !self.deny.is_match(url) && self.allow.is_match(url)
    }

    /// Returns how many URLs have been admitted, when tracked exactly
    pub fn admitted_count(&self) -> Option<usize> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exact_len()
    }
}

/// Compiles a list of case-insensitive patterns into one set
fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<RegexSet, ConfigError> {
    RegexSetBuilder::new(patterns.iter().map(|p| p.as_ref()))
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern(e.to_string()))
}
