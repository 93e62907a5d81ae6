use super::{ComponentState, DoorbotOrchestrator, ShutdownReason};
use crate::error::{DoorbotError, Result};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

impl DoorbotOrchestrator {
    /// Register components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Doorbot components");

        let mut states = self.component_states.lock().await;
        states.insert("door".to_string(), ComponentState::Stopped);
        states.insert("poller".to_string(), ComponentState::Stopped);
        states.insert("evictor".to_string(), ComponentState::Stopped);
        drop(states);

        Ok(())
    }

    /// Install signal handlers, settle the bolt position, then start the
    /// cache evictor. A signal during startup recovery safes the hardware
    /// and makes the following `run()` shut down straight away.
    pub async fn start(&mut self) -> Result<()> {
        self.install_signal_handlers().await;

        let mut receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| DoorbotError::system("Shutdown receiver already taken"))?;

        let result = self
            .start_until(async {
                match (&mut receiver).await {
                    Ok(reason) => reason,
                    // No handler left to fire; let recovery finish
                    Err(_) => std::future::pending().await,
                }
            })
            .await;

        self.shutdown_receiver = Some(receiver);
        result
    }

    /// Start, abandoning startup recovery if `shutdown` resolves first
    pub async fn start_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ShutdownReason>,
    {
        info!("Starting Doorbot");

        self.set_component_state("door", ComponentState::Starting)
            .await;
        let policy = self.config.door.startup_recovery;
        let agent = self
            .agent
            .as_mut()
            .ok_or_else(|| DoorbotError::system("Poll agent not available"))?;

        let recovery = tokio::select! {
            reason = shutdown => Err(reason),
            result = agent.controller_mut().recover_on_startup(policy) => Ok(result),
        };

        match recovery {
            Ok(Ok(outcome)) => {
                info!("Startup recovery: {:?}", outcome);
                self.set_component_state("door", ComponentState::Running)
                    .await;
            }
            Ok(Err(e)) => {
                error!("Startup recovery failed: {}", e);
                self.set_component_state("door", ComponentState::Failed)
                    .await;
                return Err(e.into());
            }
            Err(reason) => {
                warn!("Shutdown requested during startup recovery: {:?}", reason);
                if let Err(e) = agent.controller_mut().shutdown() {
                    error!("Error releasing door hardware: {}", e);
                }
                self.startup_interrupt = Some(reason);
                return Ok(());
            }
        }

        self.set_component_state("evictor", ComponentState::Starting)
            .await;
        let handle = Arc::clone(&self.evictor).start(
            self.config.cache.evict_interval(),
            self.cancellation_token.child_token(),
        );
        self.evictor_handle = Some(handle);
        self.set_component_state("evictor", ComponentState::Running)
            .await;

        info!("Doorbot started successfully");
        Ok(())
    }
}
