use super::{ComponentState, DoorbotOrchestrator, ShutdownReason};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const EVICTOR_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl DoorbotOrchestrator {
    /// Stop the evictor and release the lock hardware
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = reason.exit_code();

        self.set_component_state("poller", ComponentState::Stopped)
            .await;

        self.stop_evictor().await;

        self.set_component_state("door", ComponentState::Stopping)
            .await;
        let released = match self.agent.as_mut() {
            Some(agent) => agent.controller_mut().shutdown(),
            None => Ok(()),
        };
        match released {
            Ok(()) => {
                self.set_component_state("door", ComponentState::Stopped)
                    .await;
                info!("Door hardware released");
            }
            Err(e) => {
                error!("Error releasing door hardware: {}", e);
                self.set_component_state("door", ComponentState::Failed)
                    .await;
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_evictor(&mut self) {
        let Some(handle) = self.evictor_handle.take() else {
            self.set_component_state("evictor", ComponentState::Stopped)
                .await;
            return;
        };

        self.set_component_state("evictor", ComponentState::Stopping)
            .await;
        match timeout(EVICTOR_STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => {
                self.set_component_state("evictor", ComponentState::Stopped)
                    .await;
                info!("evictor component stopped");
            }
            Ok(Err(e)) => {
                error!("Evictor task failed: {}", e);
                self.set_component_state("evictor", ComponentState::Failed)
                    .await;
            }
            Err(_) => {
                warn!("evictor component stop timeout");
                self.set_component_state("evictor", ComponentState::Failed)
                    .await;
            }
        }
    }
}
