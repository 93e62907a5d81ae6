use super::types::{ComponentState, ShutdownReason};
use crate::agent::{PollAgent, PollSettings};
use crate::audit::UnlockLog;
use crate::cache::{CacheEvictor, CommandSync};
use crate::clock::{Clock, TokioClock};
use crate::config::DoorbotConfig;
use crate::door::{CycleTimings, UnlockController};
use crate::error::Result;
use crate::hardware::{open_hardware, DoorHardware};
use crate::server::{DoorServer, HttpDoorServer};
use crate::sound::{ClipReservations, CommandPlayer, SoundPlayer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the poll agent (and through it the lock hardware) plus the
/// background cache evictor.
pub struct DoorbotOrchestrator {
    pub(super) config: DoorbotConfig,

    // Components
    pub(super) agent: Option<PollAgent>,
    pub(super) evictor: Arc<CacheEvictor>,
    pub(super) evictor_handle: Option<JoinHandle<()>>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    /// Set when shutdown was requested before the poll loop started
    pub(super) startup_interrupt: Option<ShutdownReason>,
    pub(super) cancellation_token: CancellationToken,
}

impl DoorbotOrchestrator {
    /// Build every component from configuration. `simulate` swaps the GPIO
    /// backend for the in-memory one.
    pub fn new(config: DoorbotConfig, simulate: bool) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let hardware = open_hardware(&config.pins, simulate, Arc::clone(&clock))?;
        let reservations = ClipReservations::new();
        let player = CommandPlayer::new(&config.sound, reservations.clone());
        let server = Arc::new(HttpDoorServer::new(&config.server));

        info!(
            "Door server {} (api key {})",
            server.url(),
            if config.server.api_key.is_empty() { "not set" } else { "set" }
        );

        Ok(Self::from_parts(
            config,
            server,
            hardware,
            Box::new(player),
            reservations,
            clock,
        ))
    }

    /// Assemble the orchestrator around already-built collaborators
    pub fn from_parts(
        config: DoorbotConfig,
        server: Arc<dyn DoorServer>,
        hardware: Box<dyn DoorHardware>,
        player: Box<dyn SoundPlayer>,
        reservations: ClipReservations,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let controller = UnlockController::new(
            hardware,
            player,
            Arc::clone(&clock),
            CycleTimings::from_config(&config.door),
        );
        let agent = PollAgent::new(
            server,
            controller,
            clock,
            PollSettings::from_config(&config.server),
        )
        .with_audit_log(UnlockLog::from_config(&config.audit));

        let mut evictor = CacheEvictor::new(
            config.sound.directory_path(),
            config.cache.cap_bytes,
            reservations,
        );
        if let Some(sync) = CommandSync::from_config(config.cache.sync_command.as_deref()) {
            evictor = evictor.with_sync(sync);
        }

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            agent: Some(agent),
            evictor: Arc::new(evictor),
            evictor_handle: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            startup_interrupt: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DoorbotConfig {
        &self.config
    }

    pub fn agent(&self) -> Option<&PollAgent> {
        self.agent.as_ref()
    }
}
