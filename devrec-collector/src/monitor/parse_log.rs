//! Durable log of parsing failures, one JSON object per line

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseErrorEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    /// Where in the pipeline the failure surfaced
    pub trace: String,
}

pub struct ParseErrorLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ParseErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &str, trace: &str) -> std::io::Result<()> {
        let entry = ParseErrorEntry {
            time: Utc::now(),
            message: message.to_string(),
            trace: trace.to_string(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
