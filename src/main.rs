//! Tide-Crawl main entry point
//!
//! This is the command-line interface for the Tide-Crawl staged crawler.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tide_crawl::config::{load_config_with_hash, validate, Config, OutputFormat, SeedConfig};
use tide_crawl::crawler::run_crawl;
use tide_crawl::output::print_report;
use tracing_subscriber::EnvFilter;

/// Tide-Crawl: a staged, concurrent web crawler
///
/// Tide-Crawl fetches pages with a pool of workers, extracts links and page
/// titles, feeds new links back into fetching and saves the records it
/// finds. The crawl ends once every queue is empty and no worker is busy.
#[derive(Parser, Debug)]
#[command(name = "tide-crawl")]
#[command(version = "1.0.0")]
#[command(about = "A staged, concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// URL to start crawling from (overrides [seed].url)
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Maximum link depth to follow
    #[arg(long, value_name = "DEPTH")]
    max_depth: Option<u32>,

    /// Number of concurrent fetch workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Output file (text output goes to stdout when omitted)
    #[arg(long, value_name = "PATH")]
    output: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Text,
    Sqlite,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Sqlite => OutputFormat::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (config, hash)
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            (Config::default(), "defaults".to_string())
        }
    };

    apply_overrides(&mut config, &cli);
    validate(&config).context("Invalid configuration")?;

    let seed = config
        .seed
        .clone()
        .context("No seed URL: pass --seed or add a [seed] table to the configuration")?;

    if cli.dry_run {
        handle_dry_run(&config, &seed);
        return Ok(());
    }

    let report = run_crawl(&config, &seed, &config_hash)
        .await
        .context("Crawl failed")?;

    if !cli.quiet {
        print_report(&report);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tide_crawl=info,warn"),
            1 => EnvFilter::new("tide_crawl=debug,info"),
            2 => EnvFilter::new("tide_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies command-line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.seed {
        config.seed = Some(match config.seed.take() {
            Some(seed) => SeedConfig {
                url: url.clone(),
                ..seed
            },
            None => SeedConfig::new(url.clone()),
        });
    }

    if let Some(depth) = cli.max_depth {
        config.parser.max_depth = Some(depth);
    }

    if let Some(workers) = cli.workers {
        config.pipeline.fetch_workers = workers;
    }

    if let Some(format) = cli.format {
        let format = OutputFormat::from(format);
        if format != config.output.format && cli.output.is_none() {
            config.output.path = format.default_path().map(str::to_string);
        }
        config.output.format = format;
    }

    if let Some(path) = &cli.output {
        config.output.path = Some(path.clone());
    }
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, seed: &SeedConfig) {
    println!("=== Tide-Crawl Dry Run ===\n");

    println!("Seed:");
    println!("  URL: {}", seed.url);
    println!("  Keys: {}", seed.keys);
    println!("  Priority: {}, depth: {}", seed.priority, seed.depth);

    println!("\nPipeline:");
    println!("  Fetch workers: {}", config.pipeline.fetch_workers);
    println!("  Parse workers: {}", config.pipeline.parse_workers);
    println!("  Save workers: {}", config.pipeline.save_workers);
    println!("  Queue wait: {}ms", config.pipeline.queue_wait_ms);

    println!("\nFetcher:");
    println!("  Max retries: {}", config.fetcher.max_repeat);
    println!("  Request timeout: {}ms", config.fetcher.request_timeout_ms);
    println!("  User agents: {}", config.fetcher.user_agents.len());

    println!("\nParser:");
    match config.parser.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }

    println!("\nFilter:");
    println!("  Deny patterns ({}):", config.filter.deny.len());
    for pattern in &config.filter.deny {
        println!("    - {}", pattern);
    }
    println!("  Allow patterns ({}):", config.filter.allow.len());
    for pattern in &config.filter.allow {
        println!("    - {}", pattern);
    }
    match config.filter.bloom_capacity {
        Some(capacity) => println!(
            "  Duplicates: Bloom filter (starting at {} URLs, error rate {})",
            capacity, config.filter.bloom_error_rate
        ),
        None => println!("  Duplicates: exact set"),
    }
    if !config.filter.known_urls.is_empty() {
        println!("  Known URLs: {}", config.filter.known_urls.len());
    }

    println!("\nOutput:");
    println!("  Format: {:?}", config.output.format);
    println!(
        "  Path: {}",
        config.output.path.as_deref().unwrap_or("stdout")
    );

    println!("\n✓ Configuration is valid");
}
