//! Tab-separated text output
//!
//! One line per record: `url <TAB> keys-as-json <TAB> title <TAB> fetched_at`.

use crate::capability::{PageRecord, Saver};
use crate::output::{OutputError, OutputResult};
use async_trait::async_trait;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Saver writing one line per record to any writer
pub struct TextSaver<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> TextSaver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the saver, returning the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_line<K: Serialize>(&self, url: &str, keys: &K, record: &PageRecord) -> OutputResult<()> {
        let keys = serde_json::to_string(keys)?;
        let title = record.title.replace(['\t', '\n', '\r'], " ");

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock text output: {}", e)))?;
        writeln!(
            writer,
            "{}\t{}\t{}\t{}",
            url,
            keys,
            title,
            record.fetched_at.to_rfc3339()
        )?;
        Ok(())
    }
}

impl TextSaver<BufWriter<File>> {
    /// Creates (or truncates) a file to write lines into
    pub fn create(path: &Path) -> OutputResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl TextSaver<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

#[async_trait]
impl<K, W> Saver<K, PageRecord> for TextSaver<W>
where
    K: Serialize + Send + Sync,
    W: Write + Send,
{
    async fn save(&self, url: &str, keys: &K, record: &PageRecord) -> bool {
        match self.write_line(url, keys, record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write {}: {}", url, e);
                false
            }
        }
    }

    async fn finalize(&self) -> OutputResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock text output: {}", e)))?;
        writer.flush()?;
        Ok(())
    }
}
