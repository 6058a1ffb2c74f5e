//! Append-only feedback log stored as JSON Lines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("feedback I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("feedback record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Helpful,
    NotHelpful,
}

impl Rating {
    pub fn from_thumbs_up(thumbs_up: bool) -> Self {
        if thumbs_up {
            Rating::Helpful
        } else {
            Rating::NotHelpful
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub message_id: String,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_solution: Option<String>,
    pub query: String,
    /// The answer being rated, as the client echoed it.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub agent_response: Value,
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(message_id: impl Into<String>, rating: Rating, query: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            rating,
            reason_code: None,
            corrected_solution: None,
            query: query.into(),
            agent_response: Value::Null,
            recorded_at: Utc::now(),
        }
    }
}

/// Writes are serialized through the mutex so concurrent requests never
/// interleave partial lines.
pub struct FeedbackStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FeedbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, record: &FeedbackRecord) -> Result<(), FeedbackError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::info!(
            message_id = %record.message_id,
            rating = ?record.rating,
            "feedback.recorded"
        );
        Ok(())
    }

    /// Every record in write order. A missing log is empty; unreadable
    /// lines are skipped.
    pub async fn list(&self) -> Result<Vec<FeedbackRecord>, FeedbackError> {
        let _guard = self.lock.lock().await;
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FeedbackRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(line = index + 1, reason = %err, "feedback.line_skipped")
                }
            }
        }
        Ok(records)
    }
}
