use crate::door::UnlockRequest;
use crate::error::PollError;
use crate::sound::SoundRequest;
use serde::Deserialize;
use std::time::Duration;

/// Longer holds from the server are ignored in favour of the configured one
pub const MAX_HOLD: Duration = Duration::from_secs(300);

/// Body of the poll endpoint
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ServerStatus {
    #[serde(rename = "letmein", default)]
    pub unlock: bool,

    #[serde(default)]
    pub sound: Option<String>,

    /// Seconds; only values in (0, MAX_HOLD] override the configured hold
    #[serde(default)]
    pub hold_time: Option<f64>,

    #[serde(default)]
    pub sender: Option<String>,
}

impl ServerStatus {
    pub fn parse(body: &str) -> Result<Self, PollError> {
        serde_json::from_str(body).map_err(|e| PollError::MalformedBody {
            details: e.to_string(),
        })
    }

    /// The unlock command carried by this status, if any
    pub fn unlock_request(&self) -> Option<UnlockRequest> {
        if !self.unlock {
            return None;
        }

        let hold = self
            .hold_time
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|hold| *hold <= MAX_HOLD);
        let sender = self
            .sender
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Some(UnlockRequest {
            sound: SoundRequest::from_server(self.sound.as_deref()),
            hold,
            sender,
        })
    }
}
