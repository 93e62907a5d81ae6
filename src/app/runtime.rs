use super::{ComponentState, DoorbotOrchestrator, ShutdownReason};
use crate::error::{DoorbotError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl DoorbotOrchestrator {
    /// Run the poll loop until a signal or a fatal error, then shut down.
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        self.install_signal_handlers().await;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| DoorbotError::system("Shutdown receiver already taken"))?;

        self.run_until(async move {
            shutdown_receiver.await.unwrap_or_else(|_| {
                ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
            })
        })
        .await
    }

    /// Run the poll loop until `shutdown` resolves or the loop hits a
    /// fatal condition. A cycle in flight when `shutdown` fires is
    /// abandoned and the hardware safed during shutdown.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<i32>
    where
        F: Future<Output = ShutdownReason>,
    {
        if let Some(reason) = self.startup_interrupt.take() {
            info!("Shutdown initiated during startup: {:?}", reason);
            return self.shutdown(&reason).await;
        }

        self.set_component_state("poller", ComponentState::Running)
            .await;
        info!("Doorbot is running");

        let agent = self
            .agent
            .as_mut()
            .ok_or_else(|| DoorbotError::system("Poll agent not available"))?;

        let reason = tokio::select! {
            reason = shutdown => reason,
            result = agent.run() => match result {
                Ok(()) => ShutdownReason::Error("Poll loop ended".to_string()),
                Err(e) => {
                    error!("Fatal: {}", e);
                    ShutdownReason::Error(e.to_string())
                }
            },
        };

        info!("Shutdown initiated: {:?}", reason);
        let exit_code = self.shutdown(&reason).await?;

        info!("Doorbot shutdown complete");
        Ok(exit_code)
    }

    /// Install the signal handlers once; later calls are no-ops
    pub(super) async fn install_signal_handlers(&mut self) {
        if let Some(sender) = self.shutdown_sender.take() {
            self.setup_signal_handlers(sender).await;
        }
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::spawn(async move {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                                let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                            }
                        }
                    });
                }
                Err(e) => error!("Failed to register SIGTERM handler: {}", e),
            }
        }

        // Handle SIGINT (Ctrl+C)
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
