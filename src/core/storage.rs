//! Input storage.
//!
//! Raw inputs are persisted before a job starts so the job (and its audit
//! record) can point at a stable copy.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{InputDescriptor, StoredInput};

/// Collaborator that persists a job's raw input
#[async_trait]
pub trait InputStore: Send + Sync {
    async fn upload(&self, payload: &[u8], input: &InputDescriptor) -> Result<StoredInput>;
}

/// Stores inputs as files in a local directory
#[derive(Debug, Clone)]
pub struct LocalInputStore {
    dir: PathBuf,
}

impl LocalInputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl InputStore for LocalInputStore {
    async fn upload(&self, payload: &[u8], input: &InputDescriptor) -> Result<StoredInput> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create files directory: {}", self.dir.display()))?;

        let file_id = generate_file_id();
        let extension = Path::new(&input.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let stored_path = self.dir.join(format!("{}.{}", file_id, extension));

        debug!(%file_id, path = %stored_path.display(), "storing input");

        let dir = self.dir.clone();
        let target = stored_path.clone();
        let bytes = payload.to_vec();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .context("Input write task panicked")??;

        let stored = StoredInput {
            file_id,
            stored_path,
            size_bytes: payload.len() as u64,
            sha256: sha256_hex(payload),
            uploaded_at: Utc::now(),
        };

        info!(
            file_id = %stored.file_id,
            filename = %input.filename,
            size_bytes = stored.size_bytes,
            "input stored"
        );
        Ok(stored)
    }
}

/// Write to a temp file in `dir`, then rename over `target`
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp.write_all(bytes).context("Failed to write input")?;
    temp.flush().context("Failed to flush input")?;
    temp.persist(target)
        .with_context(|| format!("Failed to persist input: {}", target.display()))?;
    Ok(())
}

/// `file_` followed by 8 hex characters
pub fn generate_file_id() -> String {
    format!("file_{}", short_hex())
}

/// `entity_` followed by 8 hex characters
pub fn generate_entity_id() -> String {
    format!("entity_{}", short_hex())
}

fn short_hex() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Full SHA256 of `bytes`, lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
