pub mod agent;
pub mod app;
pub mod audit;
pub mod cache;
pub mod clock;
pub mod config;
pub mod door;
pub mod error;
pub mod hardware;
pub mod server;
pub mod sound;

pub use agent::{PollAgent, PollSettings, PollState};
pub use app::{ComponentState, DoorbotOrchestrator, ShutdownReason};
pub use audit::{UnlockEvent, UnlockLog};
pub use cache::{CacheEntry, CacheEvictor, CommandSync, EvictionReport};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{DoorbotConfig, StartupRecovery};
pub use door::{
    CycleOutcome, CycleReport, CycleTimings, DoorOpened, LockState, UnlockController, UnlockRequest,
};
pub use error::{DoorbotError, Result};
pub use hardware::{open_hardware, Direction, DoorHardware, Endstop, PwmSettings, SimulatedHardware};
pub use server::{DoorServer, Heartbeat, HttpDoorServer, ServerStatus};
pub use sound::{ClipReservations, CommandPlayer, SoundLibrary, SoundPlayer, SoundRequest};
