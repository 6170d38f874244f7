//! Result Persistence
//!
//! Every calculation result is stored together with the registry version it was
//! computed against, so it can be re-audited later. Storage backends live
//! behind [`ResultSink`]; an in-memory sink and an append-only JSONL sink ship here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

use crate::engine::calculator::CalculationResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub result: CalculationResult,
    pub registry_version: String,
    pub computed_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(result: CalculationResult, registry_version: impl Into<String>, computed_at: DateTime<Utc>) -> Self {
        Self {
            result,
            registry_version: registry_version.into(),
            computed_at,
        }
    }
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist a batch; returns how many records were written.
    async fn store(&self, records: &[ResultRecord]) -> Result<usize>;

    /// Every stored version of one activity record, oldest first.
    async fn history(&self, record_id: &str) -> Result<Vec<ResultRecord>>;

    async fn count(&self) -> Result<usize>;
}

#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<ResultRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn store(&self, records: &[ResultRecord]) -> Result<usize> {
        let mut stored = self.records.write().await;
        stored.extend_from_slice(records);
        Ok(records.len())
    }

    async fn history(&self, record_id: &str) -> Result<Vec<ResultRecord>> {
        let stored = self.records.read().await;
        Ok(stored
            .iter()
            .filter(|r| r.result.record_id == record_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

/// One JSON document per line, append-only.
pub struct JsonlSink {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load_all(&self) -> Result<Vec<ResultRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read result log {:?}", self.path))?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Corrupt result log {:?} at line {}", self.path, n + 1))
            })
            .collect()
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn store(&self, records: &[ResultRecord]) -> Result<usize> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open result log {:?}", self.path))?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended {} results to {:?}", records.len(), self.path);
        Ok(records.len())
    }

    async fn history(&self, record_id: &str) -> Result<Vec<ResultRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| r.result.record_id == record_id)
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        Ok(self.load_all().await?.len())
    }
}
