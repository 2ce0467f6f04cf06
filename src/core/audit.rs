//! Append-only audit trail of finished jobs.
//!
//! One JSON line per job in `audit.jsonl`. Appends take an exclusive
//! file lock so concurrent jobs (or processes) never interleave lines.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ExecutionState, JobStatus};

use super::orchestrator::Observability;

/// Persisted summary of one finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: Uuid,
    pub entity_id: String,
    pub file_id: String,
    pub filename: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub execution_time_seconds: f64,
    pub observability: Observability,
}

impl AuditRecord {
    pub fn from_state(
        state: &ExecutionState,
        ended_at: DateTime<Utc>,
        execution_time_seconds: f64,
    ) -> Self {
        Self {
            job_id: state.job_id,
            entity_id: state.entity_id.clone(),
            file_id: state.stored.file_id.clone(),
            filename: state.input.filename.clone(),
            status: state.status,
            error: state.error.clone(),
            started_at: state.start_time,
            ended_at,
            execution_time_seconds,
            observability: Observability::from_state(state),
        }
    }
}

/// JSONL-backed audit store
#[derive(Debug, Clone)]
pub struct AuditStore {
    path: PathBuf,
}

impl AuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record under an exclusive lock
    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize audit record")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &json))
            .await
            .context("Audit write task panicked")??;

        debug!(job_id = %record.job_id, path = %self.path.display(), "audit record appended");
        Ok(())
    }

    /// All records in append order
    pub async fn replay(&self) -> Result<Vec<AuditRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit file: {}", self.path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut records = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: AuditRecord = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse audit record: {}", line))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Latest record for a job
    pub async fn find(&self, job_id: Uuid) -> Result<Option<AuditRecord>> {
        let records = self.replay().await?;
        Ok(records.into_iter().rev().find(|r| r.job_id == job_id))
    }

    /// Most recent records first
    pub async fn list(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.replay().await?;
        Ok(records.into_iter().rev().take(limit).collect())
    }
}

fn append_line(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create audit directory: {}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit file: {}", path.display()))?;

    file.lock_exclusive()
        .context("Failed to acquire file lock on audit.jsonl")?;

    writeln!(file, "{}", json).context("Failed to write audit record")?;
    file.flush().context("Failed to flush audit record")?;

    // lock released on drop
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::tests::test_state;
    use tempfile::TempDir;

    fn record(status: JobStatus) -> AuditRecord {
        let mut state = test_state(3);
        state.finish(status);
        AuditRecord::from_state(&state, Utc::now(), 0.25)
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let store = AuditStore::new(temp.path().join("nested").join("audit.jsonl"));

        let first = record(JobStatus::Success);
        let second = record(JobStatus::Failed);
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        let records = store.replay().await.unwrap();
        assert_eq!(records, vec![first.clone(), second.clone()]);

        assert_eq!(store.find(second.job_id).await.unwrap(), Some(second.clone()));
        assert_eq!(store.find(Uuid::new_v4()).await.unwrap(), None);

        let listed = store.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, second.job_id);
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let temp = TempDir::new().unwrap();
        let store = AuditStore::new(temp.path().join("audit.jsonl"));

        assert!(store.replay().await.unwrap().is_empty());
        assert!(store.list(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_line_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        assert!(AuditStore::new(path).replay().await.is_err());
    }
}
