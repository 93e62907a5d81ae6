use super::state::LockState;
use crate::clock::Clock;
use crate::config::{DoorConfig, StartupRecovery};
use crate::error::HardwareError;
use crate::hardware::{Direction, DoorHardware, Endstop, PwmSettings};
use crate::sound::{Playback, SoundPlayer, SoundRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Timing and drive parameters for one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleTimings {
    pub settle: Duration,
    pub unlock_timeout: Duration,
    pub relock_timeout: Duration,
    pub hold: Duration,
    pub limit_poll: Duration,
    pub pwm: PwmSettings,
}

impl CycleTimings {
    pub fn from_config(config: &DoorConfig) -> Self {
        Self {
            settle: Duration::from_secs_f64(config.settle_secs),
            unlock_timeout: Duration::from_secs_f64(config.unlock_timeout_secs),
            relock_timeout: Duration::from_secs_f64(config.relock_timeout_secs),
            hold: Duration::from_secs_f64(config.hold_secs),
            limit_poll: Duration::from_secs_f64(config.limit_poll_secs),
            pwm: PwmSettings::from_config(config),
        }
    }
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self::from_config(&crate::config::DoorbotConfig::default().door)
    }
}

/// One unlock command as received from the server
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockRequest {
    pub sound: SoundRequest,
    /// Overrides the configured hold when set
    pub hold: Option<Duration>,
    pub sender: Option<String>,
}

impl Default for UnlockRequest {
    fn default() -> Self {
        Self {
            sound: SoundRequest::Random,
            hold: None,
            sender: None,
        }
    }
}

/// Summary of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub sender: Option<String>,
    pub clip: Option<String>,
    pub hold: Duration,
    /// Open end stop was seen before the unlock timeout
    pub open_confirmed: bool,
    /// Closed end stop was seen before the relock timeout
    pub closed_confirmed: bool,
}

/// The bolt was driven open; recorded even if the cycle later faults
#[derive(Debug, Clone, PartialEq)]
pub struct DoorOpened {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub sender: Option<String>,
    pub clip: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// A cycle was already active (or the controller is faulted)
    Ignored(LockState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    AssumedLocked,
    AlreadyClosed,
    Relocked,
}

/// Owns the lock hardware and runs the unlock -> hold -> relock sequence.
///
/// Motor power is asserted on entry to `PoweringOn` and deasserted
/// exactly once, either at the end of `PoweringOff` or by the fail-safe
/// path. Dropping the controller mid-cycle also safes the outputs.
pub struct UnlockController {
    hardware: Box<dyn DoorHardware>,
    player: Box<dyn SoundPlayer>,
    clock: Arc<dyn Clock>,
    timings: CycleTimings,
    state: LockState,
    cycle_states: Vec<LockState>,
    playback: Option<Playback>,
    opened: Option<DoorOpened>,
}

impl UnlockController {
    pub fn new(
        hardware: Box<dyn DoorHardware>,
        player: Box<dyn SoundPlayer>,
        clock: Arc<dyn Clock>,
        timings: CycleTimings,
    ) -> Self {
        Self {
            hardware,
            player,
            clock,
            timings,
            state: LockState::Locked,
            cycle_states: Vec::new(),
            playback: None,
            opened: None,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn timings(&self) -> &CycleTimings {
        &self.timings
    }

    /// Take the open record of the most recent cycle, if the bolt got that far
    pub fn take_opened(&mut self) -> Option<DoorOpened> {
        self.opened.take()
    }

    /// States entered during the most recent cycle, in order
    pub fn last_cycle_states(&self) -> &[LockState] {
        &self.cycle_states
    }

    pub fn available_clips(&self) -> Vec<String> {
        self.player.available_clips()
    }

    /// Run a full unlock cycle.
    ///
    /// Returns `Ignored` without touching the hardware unless the lock is
    /// idle. A hardware error safes the outputs, latches `Faulted` and is
    /// returned to the caller.
    pub async fn unlock(&mut self, request: &UnlockRequest) -> Result<CycleOutcome, HardwareError> {
        if self.state != LockState::Locked {
            warn!("Unlock request ignored while lock is {}", self.state);
            return Ok(CycleOutcome::Ignored(self.state));
        }

        let cycle_id = Uuid::new_v4().to_string();
        self.cycle_states.clear();
        self.opened = None;

        info!("{}", "=".repeat(60));
        info!("UNLOCKING DOOR (cycle {})", cycle_id);
        if let Some(sender) = &request.sender {
            info!("Triggered by: {}", sender);
        }

        match self.run_cycle(&cycle_id, request).await {
            Ok(report) => {
                info!("Cycle {} done", cycle_id);
                info!("{}", "=".repeat(60));
                Ok(CycleOutcome::Completed(report))
            }
            Err(e) => {
                error!("Hardware fault during cycle {} in {}: {}", cycle_id, self.state, e);
                self.fail_safe();
                Err(e)
            }
        }
    }

    /// Apply the configured policy for an unknown bolt position at startup
    pub async fn recover_on_startup(
        &mut self,
        policy: StartupRecovery,
    ) -> Result<RecoveryOutcome, HardwareError> {
        match policy {
            StartupRecovery::AssumeLocked => {
                info!("Startup recovery: assuming bolt is locked");
                Ok(RecoveryOutcome::AssumedLocked)
            }
            StartupRecovery::RelockIfOpen => {
                let open = self.hardware.limit_reached(Endstop::Open)?;
                if !open {
                    info!("Startup recovery: open limit switch not pressed, bolt locked");
                    return Ok(RecoveryOutcome::AlreadyClosed);
                }

                warn!("Startup recovery: bolt found retracted, relocking");
                self.cycle_states.clear();
                match self.run_relock_only().await {
                    Ok(_) => Ok(RecoveryOutcome::Relocked),
                    Err(e) => {
                        error!("Hardware fault during startup relock: {}", e);
                        self.fail_safe();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Deassert every output regardless of state. Used on shutdown.
    pub fn shutdown(&mut self) -> Result<(), HardwareError> {
        info!("Releasing door hardware (state: {})", self.state);
        self.stop_playback();
        let result = self.hardware.safe_outputs();
        if self.state.is_energized() {
            self.transition(LockState::Faulted);
        }
        result
    }

    async fn run_cycle(
        &mut self,
        cycle_id: &str,
        request: &UnlockRequest,
    ) -> Result<CycleReport, HardwareError> {
        let started_at = Utc::now();

        self.power_on().await?;

        // Unlocking
        self.transition(LockState::Unlocking);
        info!("Starting motor (unlock)...");
        self.hardware.set_direction(Direction::Open)?;
        self.hardware.start_pwm(self.timings.pwm)?;
        let open_confirmed = self
            .wait_for_endstop(Endstop::Open, self.timings.unlock_timeout)
            .await?;
        if open_confirmed {
            info!("Unlocked!");
        } else {
            warn!(
                "Open limit switch not reached within {:?}, continuing",
                self.timings.unlock_timeout
            );
        }
        self.hardware.stop_pwm()?;

        // HoldingOpen
        self.transition(LockState::HoldingOpen);
        let clip = self.start_sound(&request.sound);
        self.opened = Some(DoorOpened {
            cycle_id: cycle_id.to_string(),
            started_at,
            sender: request.sender.clone(),
            clip: clip.clone(),
        });
        let hold = request.hold.unwrap_or(self.timings.hold);
        info!("Holding for {:.1}s...", hold.as_secs_f64());
        self.clock.sleep(hold).await;

        let closed_confirmed = self.relock().await?;
        self.power_off()?;

        Ok(CycleReport {
            cycle_id: cycle_id.to_string(),
            started_at,
            sender: request.sender.clone(),
            clip,
            hold,
            open_confirmed,
            closed_confirmed,
        })
    }

    async fn run_relock_only(&mut self) -> Result<(), HardwareError> {
        self.power_on().await?;
        self.relock().await?;
        self.power_off()
    }

    async fn power_on(&mut self) -> Result<(), HardwareError> {
        self.transition(LockState::PoweringOn);
        info!("Activating relay...");
        self.hardware.set_relay(true)?;
        self.clock.sleep(self.timings.settle).await;
        Ok(())
    }

    async fn relock(&mut self) -> Result<bool, HardwareError> {
        self.transition(LockState::Relocking);
        info!(
            "Relocking (up to {:.1}s)...",
            self.timings.relock_timeout.as_secs_f64()
        );
        self.hardware.set_direction(Direction::Close)?;
        self.hardware.start_pwm(self.timings.pwm)?;
        let closed_confirmed = self
            .wait_for_endstop(Endstop::Closed, self.timings.relock_timeout)
            .await?;
        self.hardware.stop_pwm()?;
        if closed_confirmed {
            info!("Closed limit switch reached");
        } else {
            debug!("Relock ran for the full relock time");
        }
        Ok(closed_confirmed)
    }

    fn power_off(&mut self) -> Result<(), HardwareError> {
        self.transition(LockState::PoweringOff);
        info!("Relay off");
        self.hardware.set_relay(false)?;
        self.transition(LockState::Locked);
        Ok(())
    }

    /// Poll a limit switch until pressed or `timeout` elapses
    async fn wait_for_endstop(
        &mut self,
        endstop: Endstop,
        timeout: Duration,
    ) -> Result<bool, HardwareError> {
        let start = self.clock.now();
        loop {
            if self.hardware.limit_reached(endstop)? {
                debug!(
                    "{:?} limit switch pressed after {:?}",
                    endstop,
                    self.clock.since(start)
                );
                return Ok(true);
            }
            if self.clock.since(start) >= timeout {
                return Ok(false);
            }
            self.clock.sleep(self.timings.limit_poll).await;
        }
    }

    fn start_sound(&mut self, request: &SoundRequest) -> Option<String> {
        self.stop_playback();
        match self.player.play(request) {
            Ok(Some(playback)) => {
                let clip = playback.clip.clone();
                self.playback = Some(playback);
                Some(clip)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Sound error: {}", e);
                None
            }
        }
    }

    fn stop_playback(&mut self) {
        if let Some(playback) = self.playback.take() {
            if !playback.handle.is_finished() {
                debug!("Stopping playback of {}", playback.clip);
                playback.handle.abort();
            }
        }
    }

    fn fail_safe(&mut self) {
        self.stop_playback();
        if let Err(e) = self.hardware.safe_outputs() {
            error!("Failed to safe outputs after fault: {}", e);
        }
        self.transition(LockState::Faulted);
    }

    fn transition(&mut self, next: LockState) {
        if self.state != next {
            info!("Lock state: {} -> {}", self.state, next);
        }
        self.state = next;
        self.cycle_states.push(next);
    }
}

impl Drop for UnlockController {
    fn drop(&mut self) {
        if self.state.is_energized() {
            warn!("Door controller dropped while {}, safing outputs", self.state);
            self.stop_playback();
            if let Err(e) = self.hardware.safe_outputs() {
                error!("Failed to safe outputs on drop: {}", e);
            }
        }
    }
}
