use crate::audit::{UnlockEvent, UnlockLog};
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::door::{CycleOutcome, UnlockController, UnlockRequest};
use crate::error::{DoorbotError, Result};
use crate::server::{DoorServer, Heartbeat};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub max_consecutive_failures: u32,
    /// Sound list and heartbeat are pushed every this many polls
    pub report_every_polls: u32,
}

impl PollSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_consecutive_failures: config.max_consecutive_failures,
            report_every_polls: config.report_every_polls,
        }
    }
}

/// Counters carried from one poll to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    pub consecutive_failures: u32,
    /// Polls since the last status report
    pub polls_since_report: u32,
    pub total_polls: u64,
    pub unlocks: u64,
    pub last_unlock: Option<DateTime<Utc>>,
}

/// Polls the door server and runs unlock cycles inline.
///
/// A cycle is awaited to completion before the next poll, so commands
/// that arrive mid-cycle are never observed.
pub struct PollAgent {
    server: Arc<dyn DoorServer>,
    controller: UnlockController,
    clock: Arc<dyn Clock>,
    audit: Option<UnlockLog>,
    settings: PollSettings,
    state: PollState,
    started: Instant,
}

impl PollAgent {
    pub fn new(
        server: Arc<dyn DoorServer>,
        controller: UnlockController,
        clock: Arc<dyn Clock>,
        settings: PollSettings,
    ) -> Self {
        let started = clock.now();
        Self {
            server,
            controller,
            clock,
            audit: None,
            settings,
            state: PollState::default(),
            started,
        }
    }

    pub fn with_audit_log(mut self, audit: UnlockLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn controller(&self) -> &UnlockController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut UnlockController {
        &mut self.controller
    }

    /// Poll until a fatal condition. Only returns with an error: too many
    /// consecutive poll failures, or a hardware fault during a cycle.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Polling door server every {:?} (gives up after {} consecutive failures)",
            self.settings.poll_interval, self.settings.max_consecutive_failures
        );
        self.report_status().await;

        loop {
            self.poll_once().await?;

            self.state.polls_since_report += 1;
            if self.state.polls_since_report >= self.settings.report_every_polls {
                self.report_status().await;
                self.state.polls_since_report = 0;
            }

            self.clock.sleep(self.settings.poll_interval).await;
        }
    }

    /// One poll, plus the unlock cycle it asks for
    pub async fn poll_once(&mut self) -> Result<Option<CycleOutcome>> {
        self.state.total_polls += 1;

        match self.server.poll().await {
            Ok(status) => {
                if self.state.consecutive_failures > 0 {
                    info!(
                        "Door server reachable again after {} failed polls",
                        self.state.consecutive_failures
                    );
                }
                self.state.consecutive_failures = 0;

                match status.unlock_request() {
                    Some(request) => self.unlock(request).await.map(Some),
                    None => Ok(None),
                }
            }
            Err(e) => {
                self.state.consecutive_failures += 1;
                let count = self.state.consecutive_failures;
                warn!(
                    "Poll failed ({}/{}): {}",
                    count, self.settings.max_consecutive_failures, e
                );

                if count >= self.settings.max_consecutive_failures {
                    error!("Too many consecutive poll failures, stopping");
                    return Err(DoorbotError::TooManyPollFailures { count });
                }
                Ok(None)
            }
        }
    }

    async fn unlock(&mut self, request: UnlockRequest) -> Result<CycleOutcome> {
        let result = self.controller.unlock(&request).await;

        // The door opened even when the relock afterwards faulted
        if let Some(opened) = self.controller.take_opened() {
            self.state.unlocks += 1;
            self.state.last_unlock = Some(opened.started_at);
            let event = UnlockEvent::from_opened(&opened, &request.sound);
            self.record_unlock(&event).await;
        }

        result.map_err(Into::into)
    }

    /// Post the event and append it to the local log; failures are only logged
    async fn record_unlock(&self, event: &UnlockEvent) {
        if let Err(e) = self.server.report_unlock(event).await {
            warn!("Failed to log unlock to server: {}", e);
        }

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.append(event).await {
                warn!(
                    "Failed to write local unlock log {}: {}",
                    audit.path().display(),
                    e
                );
            }
        }
    }

    /// Push the sound list and a heartbeat. Never counts as a poll failure.
    async fn report_status(&self) {
        let clips = self.controller.available_clips();
        if let Err(e) = self.server.publish_sounds(&clips).await {
            warn!("Sound list sync error: {}", e);
        }

        let heartbeat =
            Heartbeat::collect(self.clock.since(self.started), self.state.last_unlock).await;
        debug!("Heartbeat: {:?}", heartbeat);
        if let Err(e) = self.server.send_heartbeat(&heartbeat).await {
            warn!("Heartbeat error: {}", e);
        }
    }
}
