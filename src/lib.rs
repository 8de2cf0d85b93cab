//! Tide-Crawl: a staged, concurrent web crawling pipeline
//!
//! This crate moves work through three stages (fetch, parse, save), each with
//! its own queue and pool of workers. Parsed pages fan new links back into the
//! fetch stage, a duplicate filter gates admission to it, and the run ends when
//! every queue is empty and no worker holds a task.

pub mod capability;
pub mod config;
pub mod crawler;
pub mod output;
pub mod url;

use thiserror::Error;

/// Main error type for Tide-Crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid URL pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Tide-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use capability::{FetchOutcome, Fetcher, ParseOutcome, Parser, Saver};
pub use config::Config;
pub use crawler::{Coordinator, Pipeline, Stage};
pub use output::RunReport;
pub use url::normalize_url;
