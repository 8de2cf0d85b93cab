//! Configuration module for Tide-Crawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every table is optional; missing values fall back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use tide_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Fetch workers: {}", config.pipeline.fetch_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetcherConfig, FilterConfig, OutputConfig, OutputFormat, ParserConfig, PipelineConfig,
    SeedConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
