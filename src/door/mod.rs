mod controller;
mod state;

#[cfg(test)]
mod tests;

pub use controller::{
    CycleOutcome, CycleReport, CycleTimings, DoorOpened, RecoveryOutcome, UnlockController, UnlockRequest,
};
pub use state::LockState;
