//! Run statistics
//!
//! Workers bump lock-free counters as tasks move through the pipeline; the
//! coordinator snapshots them into a [`RunReport`] once the run has ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters for one run
#[derive(Debug, Default)]
pub struct CrawlStats {
    admitted: AtomicU64,
    rejected: AtomicU64,
    fetched: AtomicU64,
    fetch_retries: AtomicU64,
    fetch_failures: AtomicU64,
    parsed: AtomicU64,
    parse_failures: AtomicU64,
    links_discovered: AtomicU64,
    records_extracted: AtomicU64,
    saved: AtomicU64,
    save_failures: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admission(&self, admitted: bool) {
        if admitted {
            bump(&self.admitted, 1);
        } else {
            bump(&self.rejected, 1);
        }
    }

    pub fn record_fetched(&self) {
        bump(&self.fetched, 1);
    }

    pub fn record_fetch_retry(&self) {
        bump(&self.fetch_retries, 1);
    }

    pub fn record_fetch_failure(&self) {
        bump(&self.fetch_failures, 1);
    }

    /// Records a successful parse and what it produced
    pub fn record_parsed(&self, links: usize, records: usize) {
        bump(&self.parsed, 1);
        bump(&self.links_discovered, links as u64);
        bump(&self.records_extracted, records as u64);
    }

    pub fn record_parse_failure(&self) {
        bump(&self.parse_failures, 1);
    }

    pub fn record_save(&self, saved: bool) {
        if saved {
            bump(&self.saved, 1);
        } else {
            bump(&self.save_failures, 1);
        }
    }

    /// Copies the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            admitted: load(&self.admitted),
            rejected: load(&self.rejected),
            fetched: load(&self.fetched),
            fetch_retries: load(&self.fetch_retries),
            fetch_failures: load(&self.fetch_failures),
            parsed: load(&self.parsed),
            parse_failures: load(&self.parse_failures),
            links_discovered: load(&self.links_discovered),
            records_extracted: load(&self.records_extracted),
            saved: load(&self.saved),
            save_failures: load(&self.save_failures),
        }
    }
}

/// Point-in-time copy of [`CrawlStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// URLs let into the fetch stage
    pub admitted: u64,

    /// URLs dropped by patterns or as duplicates
    pub rejected: u64,

    pub fetched: u64,
    pub fetch_retries: u64,

    /// Fetch tasks dropped for good
    pub fetch_failures: u64,

    pub parsed: u64,
    pub parse_failures: u64,
    pub links_discovered: u64,
    pub records_extracted: u64,
    pub saved: u64,
    pub save_failures: u64,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub stats: StatsSnapshot,

    /// Wall-clock time from seeding to finalize
    pub elapsed: Duration,

    /// Fetch tasks removed by the drain after the fetch workers exited
    pub drained_fetch: u64,

    /// Whether the saver's finalize step succeeded
    pub finalized: bool,

    /// Whether every queue was empty and no task in flight at the end
    pub quiescent: bool,
}

impl RunReport {
    /// Share of fetched pages that were parsed successfully, in percent
    pub fn parse_success_rate(&self) -> f64 {
        let attempted = self.stats.parsed + self.stats.parse_failures;
        if attempted == 0 {
            return 0.0;
        }
        (self.stats.parsed as f64 / attempted as f64) * 100.0
    }
}

/// Prints a run report to stdout
///
/// # Arguments
///
/// * `report` - The report to display
pub fn print_report(report: &RunReport) {
    let stats = &report.stats;

    println!("=== Crawl Report ===\n");

    println!("Overview:");
    println!("  Elapsed: {:.2}s", report.elapsed.as_secs_f64());
    println!("  URLs admitted: {}", stats.admitted);
    println!("  URLs rejected: {}", stats.rejected);
    println!();

    println!("Fetch:");
    println!("  Fetched: {}", stats.fetched);
    println!("  Retries: {}", stats.fetch_retries);
    println!("  Permanent failures: {}", stats.fetch_failures);
    if report.drained_fetch > 0 {
        println!("  Drained after workers exited: {}", report.drained_fetch);
    }
    println!();

    println!("Parse:");
    println!("  Parsed: {}", stats.parsed);
    println!("  Failures: {}", stats.parse_failures);
    println!("  Links discovered: {}", stats.links_discovered);
    println!("  Records extracted: {}", stats.records_extracted);
    println!();

    println!("Save:");
    println!("  Saved: {}", stats.saved);
    println!("  Failures: {}", stats.save_failures);
    println!(
        "  Output finalized: {}",
        if report.finalized { "yes" } else { "no" }
    );
    println!();

    println!(
        "Parse Success Rate: {:.1}% ({} / {} pages)",
        report.parse_success_rate(),
        stats.parsed,
        stats.parsed + stats.parse_failures
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_stats_creation() {
        let stats = CrawlStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = CrawlStats::new();
        stats.record_admission(true);
        stats.record_admission(true);
        stats.record_admission(false);
        stats.record_fetched();
        stats.record_fetch_retry();
        stats.record_parsed(3, 1);
        stats.record_parse_failure();
        stats.record_save(true);
        stats.record_save(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.admitted, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.fetched, 1);
        assert_eq!(snapshot.fetch_retries, 1);
        assert_eq!(snapshot.parsed, 1);
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.links_discovered, 3);
        assert_eq!(snapshot.records_extracted, 1);
        assert_eq!(snapshot.saved, 1);
        assert_eq!(snapshot.save_failures, 1);
    }

    #[test]
    fn test_parse_success_rate() {
        let mut report = RunReport {
            stats: StatsSnapshot::default(),
            elapsed: Duration::from_secs(1),
            drained_fetch: 0,
            finalized: true,
            quiescent: true,
        };
        assert_eq!(report.parse_success_rate(), 0.0);

        report.stats.parsed = 3;
        report.stats.parse_failures = 1;
        assert!((report.parse_success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
