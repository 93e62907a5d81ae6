use crate::error::CacheError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Pulls new clips into the cache by running an external copy tool.
///
/// The tool is expected to be additive (e.g. `rclone copy`); nothing here
/// deletes from the cache.
#[derive(Debug, Clone)]
pub struct CommandSync {
    argv: Vec<String>,
}

impl CommandSync {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// `None` when no command is configured or the argv list is empty
    pub fn from_config(argv: Option<&[String]>) -> Option<Self> {
        match argv {
            Some(argv) if !argv.is_empty() => Some(Self::new(argv.to_vec())),
            _ => None,
        }
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    pub async fn run(&self) -> Result<(), CacheError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Ok(());
        };

        debug!("Running sound sync: {}", self.command_line());
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CacheError::SyncCommand {
                command: self.command_line(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Sync stderr: {}", stderr.trim());
            return Err(CacheError::SyncFailed {
                command: self.command_line(),
                status: output.status.to_string(),
            });
        }

        info!("Sound sync finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_config() {
        assert!(CommandSync::from_config(None).is_none());
        let empty: Vec<String> = Vec::new();
        assert!(CommandSync::from_config(Some(empty.as_slice())).is_none());

        let configured = argv(&["rclone", "copy", "remote:sounds", "./sounds"]);
        let sync = CommandSync::from_config(Some(configured.as_slice())).unwrap();
        assert_eq!(sync.command_line(), "rclone copy remote:sounds ./sounds");
    }

    #[tokio::test]
    async fn test_successful_sync() {
        let sync = CommandSync::new(argv(&["true"]));
        assert!(sync.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_sync_failed() {
        let sync = CommandSync::new(argv(&["false"]));
        let err = sync.run().await.unwrap_err();
        assert!(matches!(err, CacheError::SyncFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let sync = CommandSync::new(argv(&["/nonexistent/doorbot-sync"]));
        let err = sync.run().await.unwrap_err();
        assert!(matches!(err, CacheError::SyncCommand { .. }));
    }
}
