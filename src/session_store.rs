//! Session persistence (CLI `--session`).
//!
//! Stores a `ScanResult` summary keyed by target URL so a second
//! invocation against the same target can be compared against the
//! last run. A `DashMap` in memory, serialized as a whole to a single
//! JSON file on every write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::model::ScanResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub target_url: String,
    pub last_run: DateTime<Utc>,
    pub dbms: Option<String>,
    pub vulnerability_count: usize,
    pub affected_parameters: usize,
}

impl SessionRecord {
    pub fn from_result(result: &ScanResult) -> Self {
        SessionRecord {
            target_url: result.target_url.clone(),
            last_run: result.end_time,
            dbms: result.dbms.as_ref().map(|d| d.name.canonical_name().to_string()),
            vulnerability_count: result.vulnerabilities.iter().filter(|v| v.injectable).count(),
            affected_parameters: result.affected_parameters(),
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    records: Arc<DashMap<String, SessionRecord>>,
    path: PathBuf,
}

impl SessionStore {
    /// Loads an existing session file, or starts empty if none exists.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read session file: {}", path.display()))?;
            let parsed: HashMap<String, SessionRecord> =
                serde_json::from_str(&contents).context("failed to parse session file")?;
            DashMap::from_iter(parsed)
        } else {
            DashMap::new()
        };

        Ok(SessionStore {
            records: Arc::new(records),
            path,
        })
    }

    pub fn get(&self, target_url: &str) -> Option<SessionRecord> {
        self.records.get(target_url).map(|r| r.value().clone())
    }

    pub fn record(&self, result: &ScanResult) -> Result<()> {
        self.records
            .insert(result.target_url.clone(), SessionRecord::from_result(result));
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory: {}", parent.display()))?;
            }
        }

        let snapshot: HashMap<String, SessionRecord> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize sessions")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write session file: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dbms, DbmsInfo};
    use tempfile::tempdir;

    fn sample_result(url: &str) -> ScanResult {
        let now = Utc::now();
        ScanResult {
            target_url: url.to_string(),
            target_method: "GET".to_string(),
            vulnerabilities: Vec::new(),
            dbms: Some(DbmsInfo {
                name: Dbms::MySQL,
                version: None,
                banner: None,
                confidence: 0.9,
            }),
            start_time: now,
            end_time: now,
            request_count: 5,
            errors: Vec::new(),
        }
    }

    #[test]
    fn records_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = SessionStore::load(&path).unwrap();
        store.record(&sample_result("https://x.test/a")).unwrap();

        let reloaded = SessionStore::load(&path).unwrap();
        let record = reloaded.get("https://x.test/a").unwrap();
        assert_eq!(record.dbms.as_deref(), Some("MySQL"));
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let store = SessionStore::load(&path).unwrap();
        assert!(store.get("https://x.test/a").is_none());
    }
}
