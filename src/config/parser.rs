use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration from TOML text
///
/// # Arguments
///
/// * `content` - TOML configuration text
///
/// # Returns
///
/// * `Ok(Config)` - Successfully parsed and validated configuration
/// * `Err(ConfigError)` - Failed to parse or validate the configuration
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tide_crawl::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("Max depth: {:?}", config.parser.max_depth);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored alongside saved records so runs made with different settings can
/// be told apart.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
