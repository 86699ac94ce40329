//! Append-only JSONL persistence for run records.
//!
//! One self-describing JSON record per line. Lines are appended in
//! completion order and never rewritten; each line carries its own id
//! and timestamp, so readers can reconstruct sequence order regardless
//! of how parallel completions interleaved on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Appends records to one JSONL file.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    path: PathBuf,
}

impl DatasetWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes one record and appends it as a single line.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record).context("failed to serialize record")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

/// Loads every parseable record from a JSONL file. Malformed lines are
/// skipped with a warning; a half-written tail must not poison the rest
/// of the dataset.
pub async fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut records = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                "dataset: skipping malformed line {} in {}: {e}",
                index + 1,
                path.display(),
            ),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::pipeline::IterationRecord;

    #[tokio::test]
    async fn test_append_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attacks.jsonl");
        let writer = DatasetWriter::new(&path);

        let first = IterationRecord::started(1).fail(Stage::Generate, "no code");
        let second = IterationRecord::started(2);
        writer.append(&first).await.unwrap();
        writer.append(&second).await.unwrap();

        let loaded: Vec<IterationRecord> = load_jsonl(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], first);
        assert_eq!(loaded[1], second);
    }

    #[tokio::test]
    async fn test_load_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attacks.jsonl");
        let writer = DatasetWriter::new(&path);
        writer.append(&IterationRecord::started(1)).await.unwrap();

        tokio::fs::write(
            &path,
            format!(
                "{}\nnot json at all\n\n{}\n",
                serde_json::to_string(&IterationRecord::started(1)).unwrap(),
                serde_json::to_string(&IterationRecord::started(2)).unwrap(),
            ),
        )
        .await
        .unwrap();

        let loaded: Vec<IterationRecord> = load_jsonl(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].id, 2);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.jsonl");
        let result: Result<Vec<IterationRecord>> = load_jsonl(&missing).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_appends_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attacks.jsonl");
        let writer = DatasetWriter::new(&path);
        for id in 1..=3 {
            writer.append(&IterationRecord::started(id)).await.unwrap();
        }
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.lines().count(), 3);
    }
}
