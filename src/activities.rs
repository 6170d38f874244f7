//! Activity data files: a YAML or JSON list of [`ActivityRecord`]s.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

use crate::engine::ActivityRecord;
use crate::factors::loader::is_yaml;

pub struct ActivityLoader {
    path: PathBuf,
}

impl ActivityLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse the file and reject it if any record is malformed or ids repeat.
    pub async fn load(&self) -> Result<Vec<ActivityRecord>> {
        let content = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read activity file {:?}", self.path))?;

        let records: Vec<ActivityRecord> = if is_yaml(&self.path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML activities {:?}", self.path))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON activities {:?}", self.path))?
        };

        let mut seen = std::collections::HashSet::new();
        for record in &records {
            record.validate()?;
            if !seen.insert(record.id.as_str()) {
                anyhow::bail!("Duplicate activity record id '{}' in {:?}", record.id, self.path);
            }
        }

        info!("Loaded {} activity records from {:?}", records.len(), self.path);
        Ok(records)
    }
}
