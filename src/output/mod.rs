//! Output module: save capabilities and run statistics
//!
//! This module handles:
//! - Persisting extracted page records (JSON document, text lines, SQLite)
//! - Closing each output target exactly once at the end of a run
//! - Counting and printing what happened during a run

mod json_output;
mod sqlite_output;
pub mod stats;
mod text_output;

pub use json_output::JsonFileSaver;
pub use sqlite_output::{RunStatus, SqliteSaver};
pub use stats::{print_report, CrawlStats, RunReport, StatsSnapshot};
pub use text_output::TextSaver;

use crate::capability::{PageRecord, Saver};
use crate::config::{OutputConfig, OutputFormat};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Output already finalized")]
    Finalized,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Opens the saver selected by the output configuration
///
/// The returned saver serves a single run; open a new one for each run.
///
/// # Arguments
///
/// * `config` - The output configuration
/// * `config_hash` - Identifies the settings of this run (stored by SQLite)
///
/// # Returns
///
/// * `Ok(Arc<dyn Saver>)` - The opened output target
/// * `Err(OutputError)` - The target could not be created
pub fn open_saver<K>(
    config: &OutputConfig,
    config_hash: &str,
) -> OutputResult<Arc<dyn Saver<K, PageRecord>>>
where
    K: Serialize + Send + Sync + 'static,
{
    let saver: Arc<dyn Saver<K, PageRecord>> = match (config.format, config.path.as_deref()) {
        (OutputFormat::Json, Some(path)) => Arc::new(JsonFileSaver::create(Path::new(path))?),
        (OutputFormat::Sqlite, Some(path)) => {
            Arc::new(SqliteSaver::open(Path::new(path), config_hash)?)
        }
        (OutputFormat::Text, Some(path)) => Arc::new(TextSaver::create(Path::new(path))?),
        (OutputFormat::Text, None) => Arc::new(TextSaver::stdout()),
        (format, None) => {
            return Err(OutputError::Write(format!(
                "output format {:?} requires a path",
                format
            )))
        }
    };

    tracing::info!(
        "Saving records as {:?} to {}",
        config.format,
        config.path.as_deref().unwrap_or("stdout")
    );
    Ok(saver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_saver_for_each_format() {
        let dir = tempdir().unwrap();

        for (format, file) in [
            (OutputFormat::Json, "out.json"),
            (OutputFormat::Text, "out.tsv"),
            (OutputFormat::Sqlite, "out.db"),
        ] {
            let config = OutputConfig {
                format,
                path: Some(dir.path().join(file).to_string_lossy().into_owned()),
            };
            let saver = open_saver::<serde_json::Value>(&config, "hash");
            assert!(saver.is_ok(), "failed to open {:?}", format);
        }
    }

    #[test]
    fn test_open_saver_requires_path_for_json() {
        let config = OutputConfig {
            format: OutputFormat::Json,
            path: None,
        };
        assert!(open_saver::<serde_json::Value>(&config, "hash").is_err());
    }
}
