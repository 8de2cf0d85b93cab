//! JSON document output
//!
//! Records are streamed into one document of the form
//! `{"urls": [ {...}, {...} ]}`. The opening is written when the file is
//! created and the closing when the saver is finalized.

use crate::capability::{PageRecord, Saver};
use crate::output::{OutputError, OutputResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// One entry of the `urls` array
#[derive(Serialize)]
struct JsonEntry<'a, K> {
    url: &'a str,
    keys: &'a K,
    title: &'a str,
    fetched_at: DateTime<Utc>,
}

struct JsonState {
    writer: BufWriter<File>,
    entries: u64,
    finalized: bool,
}

/// Saver writing a single JSON document
///
/// Serves one run: once finalized, further saves fail with
/// `OutputError::Finalized`.
pub struct JsonFileSaver {
    state: Mutex<JsonState>,
}

impl JsonFileSaver {
    /// Creates (or truncates) the file and writes the document opening
    pub fn create(path: &Path) -> OutputResult<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(b"{\n  \"urls\": [")?;
        writer.flush()?;

        Ok(Self {
            state: Mutex::new(JsonState {
                writer,
                entries: 0,
                finalized: false,
            }),
        })
    }

    fn lock(&self) -> OutputResult<std::sync::MutexGuard<'_, JsonState>> {
        self.state
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock JSON output: {}", e)))
    }

    fn append<K: Serialize>(&self, url: &str, keys: &K, record: &PageRecord) -> OutputResult<()> {
        let entry = serde_json::to_string(&JsonEntry {
            url,
            keys,
            title: &record.title,
            fetched_at: record.fetched_at,
        })?;

        let mut state = self.lock()?;
        if state.finalized {
            return Err(OutputError::Finalized);
        }

        let separator = if state.entries == 0 { "\n    " } else { ",\n    " };
        state.writer.write_all(separator.as_bytes())?;
        state.writer.write_all(entry.as_bytes())?;
        state.writer.flush()?;
        state.entries += 1;
        Ok(())
    }

    /// Returns how many entries have been written
    pub fn entries(&self) -> u64 {
        self.lock().map(|state| state.entries).unwrap_or(0)
    }
}

#[async_trait]
impl<K: Serialize + Send + Sync> Saver<K, PageRecord> for JsonFileSaver {
    async fn save(&self, url: &str, keys: &K, record: &PageRecord) -> bool {
        match self.append(url, keys, record) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to save {} to JSON: {}", url, e);
                false
            }
        }
    }

    async fn finalize(&self) -> OutputResult<()> {
        let mut state = self.lock()?;
        if state.finalized {
            return Err(OutputError::Finalized);
        }

        let closing: &[u8] = if state.entries == 0 {
            b"]\n}\n"
        } else {
            b"\n  ]\n}\n"
        };
        state.writer.write_all(closing)?;
        state.writer.flush()?;
        state.finalized = true;

        tracing::debug!("JSON output closed with {} entries", state.entries);
        Ok(())
    }
}
