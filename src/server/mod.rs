//! Door server client: the poll endpoint plus the reporting side channels
//! (unlock log, sound list, heartbeat).

mod client;
mod heartbeat;
mod status;

pub use client::HttpDoorServer;
pub use heartbeat::{parse_cpu_temp, parse_memory_used_pct, Heartbeat};
pub use status::ServerStatus;

use crate::audit::UnlockEvent;
use crate::error::PollError;
use async_trait::async_trait;

#[async_trait]
pub trait DoorServer: Send + Sync {
    /// Fetch the current unlock flag
    async fn poll(&self) -> Result<ServerStatus, PollError>;

    async fn report_unlock(&self, event: &UnlockEvent) -> Result<(), PollError>;

    async fn publish_sounds(&self, sounds: &[String]) -> Result<(), PollError>;

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), PollError>;
}
