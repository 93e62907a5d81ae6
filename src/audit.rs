//! Unlock audit trail
//!
//! Every unlock that opened the bolt is kept in a local JSON file (a plain array,
//! newest last, trimmed to the configured length) as a backup of what is
//! posted to the server.

use crate::config::AuditConfig;
use crate::door::DoorOpened;
use crate::error::AuditError;
use crate::sound::SoundRequest;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One unlock, as posted to `/log` and stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockEvent {
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub epoch: i64,
    /// Clip played, `random` when the cache was empty, `none` for silent unlocks
    pub sound: String,
    #[serde(default)]
    pub sender: String,
}

impl UnlockEvent {
    pub fn new(at: DateTime<Utc>, sound: String, sender: Option<&str>) -> Self {
        Self {
            timestamp: format_timestamp(at),
            epoch: at.timestamp(),
            sound,
            sender: sender.unwrap_or_default().to_string(),
        }
    }

    pub fn from_opened(opened: &DoorOpened, requested: &SoundRequest) -> Self {
        let sound = match (&opened.clip, requested) {
            (Some(clip), _) => clip.clone(),
            (None, SoundRequest::Silent) => "none".to_string(),
            (None, _) => "random".to_string(),
        };
        Self::new(opened.started_at, sound, opened.sender.as_deref())
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Bounded local JSON log of unlock events
pub struct UnlockLog {
    path: PathBuf,
    max_entries: usize,
}

impl UnlockLog {
    pub fn new<P: Into<PathBuf>>(path: P, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.path, config.max_entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries currently on disk. A missing file is an empty log.
    pub async fn entries(&self) -> Result<Vec<UnlockEvent>, AuditError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append an event, dropping the oldest entries beyond `max_entries`
    pub async fn append(&self, event: &UnlockEvent) -> Result<(), AuditError> {
        let mut entries = match self.entries().await {
            Ok(entries) => entries,
            Err(AuditError::Json(e)) => {
                warn!(
                    "Unlock log {} is corrupt ({}), starting a new one",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        entries.push(event.clone());
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write then rename so a crash never leaves a truncated file
        let content = serde_json::to_string_pretty(&entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            "Unlock logged to {} ({} entries)",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }
}
