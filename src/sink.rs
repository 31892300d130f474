// src/sink.rs
//! Output sinks for incremental checkpointing.
//!
//! The scheduler hands the full running record set to the sink after every completed
//! task. Writes are at-least-once per task; the file sink replaces the file atomically
//! (tmp + rename) so a crash never leaves a half-written checkpoint behind.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::record::{records_from_json, Record};

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist the whole current record set (overwrite semantics).
    async fn persist(&self, records: &[Record]) -> Result<()>;
}

/// Pretty JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a previous checkpoint, if one exists.
    pub async fn load_existing(&self) -> Result<Option<Vec<Record>>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading checkpoint {}", self.path.display()))?;
        let records = records_from_json(&s)
            .with_context(|| format!("parsing checkpoint {}", self.path.display()))?;
        Ok(Some(records))
    }
}

#[async_trait]
impl RecordSink for JsonFileSink {
    async fn persist(&self, records: &[Record]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_vec_pretty(records).context("serializing records")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(target: "sink", path = %self.path.display(), rows = records.len(), "checkpoint written");
        Ok(())
    }
}

/// Keeps every snapshot in memory. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Mutex<Vec<Vec<Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Vec<Record>> {
        self.snapshots
            .lock()
            .expect("memory sink mutex poisoned")
            .last()
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.snapshots
            .lock()
            .expect("memory sink mutex poisoned")
            .len()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(&self, records: &[Record]) -> Result<()> {
        self.snapshots
            .lock()
            .expect("memory sink mutex poisoned")
            .push(records.to_vec());
        Ok(())
    }
}
