use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoorbotError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    #[error("Hardware fault: {0}")]
    Hardware(#[from] HardwareError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Audit log error: {0}")]
    Audit(#[from] AuditError),

    #[error("Giving up after {count} consecutive poll failures")]
    TooManyPollFailures { count: u32 },

    #[error("System error: {message}")]
    System { message: String },
}

impl DoorbotError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Conditions that should stop the process and leave restarting to the supervisor
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DoorbotError::Hardware(_)
                | DoorbotError::TooManyPollFailures { .. }
                | DoorbotError::Config(_)
        )
    }
}

/// Failures talking to the door server
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("Connection failed: {details}")]
    ConnectionFailed { details: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected HTTP status {0}")]
    BadStatus(u16),

    #[error("Malformed response body: {details}")]
    MalformedBody { details: String },
}

/// Errors raised by the relay/motor/limit-switch lines
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("GPIO error on {line}: {details}")]
    Gpio { line: &'static str, details: String },

    #[error("Hardware backend unavailable: {0}")]
    Unavailable(String),

    #[error("Injected fault on {line}")]
    Injected { line: &'static str },
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Sound clip not found: {0}")]
    ClipNotFound(String),

    #[error("Failed to start player {player}: {source}")]
    Spawn {
        player: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list sound directory {directory}: {source}")]
    Directory {
        directory: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sync command {command} exited with {status}")]
    SyncFailed { command: String, status: String },

    #[error("Failed to run sync command {command}: {source}")]
    SyncCommand {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit log JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DoorbotError>;
