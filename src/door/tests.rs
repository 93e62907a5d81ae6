use super::*;
use crate::clock::{Clock, ManualClock, TokioClock};
use crate::config::StartupRecovery;
use crate::error::{HardwareError, PlaybackError};
use crate::hardware::{Direction, HardwareEvent, SimulatedHardware};
use crate::sound::{Playback, SoundPlayer, SoundRequest};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Records requests instead of playing anything
#[derive(Clone, Default)]
struct RecordingPlayer {
    requests: Arc<Mutex<Vec<SoundRequest>>>,
    fail: bool,
}

impl SoundPlayer for RecordingPlayer {
    fn play(&mut self, request: &SoundRequest) -> Result<Option<Playback>, PlaybackError> {
        self.requests.lock().push(request.clone());
        if self.fail {
            return Err(PlaybackError::ClipNotFound("broken.wav".to_string()));
        }
        Ok(None)
    }

    fn available_clips(&self) -> Vec<String> {
        vec!["chime.wav".to_string()]
    }
}

fn controller(
    clock: Arc<dyn Clock>,
    hardware: SimulatedHardware,
    player: RecordingPlayer,
) -> UnlockController {
    UnlockController::new(
        Box::new(hardware),
        Box::new(player),
        clock,
        CycleTimings::default(),
    )
}

/// Every motor run happens with the relay on and the relay ends off
fn assert_relay_brackets_motor(events: &[HardwareEvent]) {
    let mut relay = false;
    let mut pwm = false;
    for event in events {
        match event {
            HardwareEvent::Relay(on) => {
                assert!(*on || !pwm, "relay dropped while motor running");
                relay = *on;
            }
            HardwareEvent::PwmStart(_) => {
                assert!(relay, "motor started without relay power");
                pwm = true;
            }
            HardwareEvent::PwmStop => pwm = false,
            HardwareEvent::Direction(_) => {}
        }
    }
    assert!(!relay, "relay left energized");
    assert!(!pwm, "motor left running");
}

fn completed(outcome: CycleOutcome) -> CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_cycle_with_open_confirmation() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_secs(2));
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let report = completed(door.unlock(&UnlockRequest::default()).await.unwrap());

    assert!(report.open_confirmed);
    assert!(!report.closed_confirmed);
    assert_eq!(report.hold, Duration::from_secs(10));
    assert_eq!(door.state(), LockState::Locked);
    assert_eq!(
        door.last_cycle_states(),
        &[
            LockState::PoweringOn,
            LockState::Unlocking,
            LockState::HoldingOpen,
            LockState::Relocking,
            LockState::PoweringOff,
            LockState::Locked,
        ]
    );

    let events = hw.events();
    assert_eq!(events.first(), Some(&HardwareEvent::Relay(true)));
    assert_eq!(events.last(), Some(&HardwareEvent::Relay(false)));
    assert_eq!(
        events.iter().filter(|e| **e == HardwareEvent::Relay(false)).count(),
        1
    );
    assert_relay_brackets_motor(&events);
    assert!(!hw.relay_on());
    assert!(!hw.pwm_running());
}

#[tokio::test]
async fn test_hold_is_exactly_ten_seconds() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_millis(1500));
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    door.unlock(&UnlockRequest::default()).await.unwrap();

    let timeline = hw.timeline();
    let opened_stop = timeline
        .iter()
        .find(|(_, e)| *e == HardwareEvent::PwmStop)
        .map(|(t, _)| *t)
        .unwrap();
    let close_dir = timeline
        .iter()
        .find(|(_, e)| *e == HardwareEvent::Direction(Direction::Close))
        .map(|(t, _)| *t)
        .unwrap();

    // Open end stop seen within 2s of motor start (after the 0.5s settle)
    assert!(opened_stop <= Duration::from_millis(2500));
    assert_eq!(close_dir - opened_stop, Duration::from_secs(10));
    assert!(clock.sleeps().contains(&Duration::from_secs(10)));
}

#[tokio::test]
async fn test_unlock_timeout_proceeds_to_hold_and_relock() {
    let clock = Arc::new(ManualClock::new());
    // Open limit switch never fires
    let hw = SimulatedHardware::new(clock.clone());
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let report = completed(door.unlock(&UnlockRequest::default()).await.unwrap());

    assert!(!report.open_confirmed);
    assert_eq!(door.state(), LockState::Locked);

    let timeline = hw.timeline();
    let first_stop = timeline
        .iter()
        .find(|(_, e)| *e == HardwareEvent::PwmStop)
        .map(|(t, _)| *t)
        .unwrap();
    assert!(first_stop >= Duration::from_millis(10_500));
    assert!(first_stop < Duration::from_millis(10_700));

    assert_relay_brackets_motor(&hw.events());
    assert!(!hw.relay_on());
}

#[tokio::test]
async fn test_relock_stops_early_on_closed_switch() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone())
        .with_open_after(Duration::from_secs(1))
        .with_closed_after(Duration::from_secs(3));
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let report = completed(door.unlock(&UnlockRequest::default()).await.unwrap());
    assert!(report.closed_confirmed);

    let timeline = hw.timeline();
    let close_start = timeline
        .iter()
        .rev()
        .find(|(_, e)| matches!(e, HardwareEvent::PwmStart(_)))
        .map(|(t, _)| *t)
        .unwrap();
    let close_stop = timeline
        .iter()
        .rev()
        .find(|(_, e)| *e == HardwareEvent::PwmStop)
        .map(|(t, _)| *t)
        .unwrap();
    assert_eq!(close_stop - close_start, Duration::from_secs(3));
}

#[tokio::test]
async fn test_relock_without_closed_switch_runs_full_relock_time() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_secs(1));
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    door.unlock(&UnlockRequest::default()).await.unwrap();

    let timeline = hw.timeline();
    let close_start = timeline
        .iter()
        .rev()
        .find(|(_, e)| matches!(e, HardwareEvent::PwmStart(_)))
        .map(|(t, _)| *t)
        .unwrap();
    let close_stop = timeline.iter().rev().nth(1).map(|(t, _)| *t).unwrap();
    assert_eq!(close_stop - close_start, Duration::from_millis(6500));
}

#[tokio::test]
async fn test_server_hold_override() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_secs(1));
    let mut door = controller(clock.clone(), hw, RecordingPlayer::default());

    let request = UnlockRequest {
        hold: Some(Duration::from_secs(3)),
        sender: Some("alice".to_string()),
        ..UnlockRequest::default()
    };
    let report = completed(door.unlock(&request).await.unwrap());

    assert_eq!(report.hold, Duration::from_secs(3));
    assert_eq!(report.sender.as_deref(), Some("alice"));
    assert!(clock.sleeps().contains(&Duration::from_secs(3)));
    assert!(!clock.sleeps().contains(&Duration::from_secs(10)));
}

#[tokio::test]
async fn test_hardware_fault_safes_outputs_and_latches() {
    let clock = Arc::new(ManualClock::new());
    // Write #2 is the first PWM start
    let hw = SimulatedHardware::new(clock.clone())
        .with_open_after(Duration::from_secs(1))
        .fail_at_write(2);
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let err = door.unlock(&UnlockRequest::default()).await.unwrap_err();
    assert_eq!(err, HardwareError::Injected { line: "pwm" });
    assert_eq!(door.take_opened(), None);

    assert_eq!(door.state(), LockState::Faulted);
    assert!(!hw.relay_on());
    assert!(!hw.pwm_running());
    assert_eq!(
        &hw.events()[hw.events().len() - 2..],
        &[HardwareEvent::PwmStop, HardwareEvent::Relay(false)]
    );

    // Faulted controller ignores further commands
    let writes = hw.writes();
    let outcome = door.unlock(&UnlockRequest::default()).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Ignored(LockState::Faulted));
    assert_eq!(hw.writes(), writes);
}

#[tokio::test]
async fn test_fault_while_holding_open() {
    let clock = Arc::new(ManualClock::new());
    // Relay, dir, pwm start, pwm stop, then the close direction write fails
    let hw = SimulatedHardware::new(clock.clone())
        .with_open_after(Duration::from_secs(1))
        .fail_at_write(4);
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    assert!(door.unlock(&UnlockRequest::default()).await.is_err());
    assert_eq!(door.state(), LockState::Faulted);
    assert!(!hw.relay_on());
    assert!(!hw.pwm_running());
    // The bolt was open, so the cycle still counts as an unlock
    assert!(door.take_opened().is_some());
    assert!(door.take_opened().is_none());
}

#[tokio::test]
async fn test_playback_error_does_not_abort_cycle() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_secs(1));
    let player = RecordingPlayer {
        fail: true,
        ..RecordingPlayer::default()
    };
    let mut door = controller(clock.clone(), hw.clone(), player.clone());

    let request = UnlockRequest {
        sound: SoundRequest::Named("broken.wav".to_string()),
        ..UnlockRequest::default()
    };
    let report = completed(door.unlock(&request).await.unwrap());

    assert_eq!(report.clip, None);
    assert_eq!(door.state(), LockState::Locked);
    assert_eq!(player.requests.lock().as_slice(), &[request.sound.clone()]);
    assert!(!hw.relay_on());
}

#[tokio::test]
async fn test_startup_assume_locked_touches_nothing() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_bolt_open();
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let outcome = door
        .recover_on_startup(StartupRecovery::AssumeLocked)
        .await
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::AssumedLocked);
    assert_eq!(hw.writes(), 0);
    assert_eq!(hw.limit_reads(), 0);
}

#[tokio::test]
async fn test_startup_relock_if_open() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone()).with_bolt_open();
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let outcome = door
        .recover_on_startup(StartupRecovery::RelockIfOpen)
        .await
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::Relocked);
    assert_eq!(door.state(), LockState::Locked);
    assert!(!hw.bolt_open());
    assert!(hw.events().contains(&HardwareEvent::Direction(Direction::Close)));
    assert!(!hw.events().contains(&HardwareEvent::Direction(Direction::Open)));
    assert_relay_brackets_motor(&hw.events());
}

#[tokio::test]
async fn test_startup_relock_skipped_when_closed() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone());
    let mut door = controller(clock.clone(), hw.clone(), RecordingPlayer::default());

    let outcome = door
        .recover_on_startup(StartupRecovery::RelockIfOpen)
        .await
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::AlreadyClosed);
    assert_eq!(hw.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_cycle_mid_flight_safes_outputs() {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let hw = SimulatedHardware::new(Arc::clone(&clock));
    let mut door = controller(clock, hw.clone(), RecordingPlayer::default());

    // Cancelled while waiting for the open end stop, as on SIGTERM
    let cycle = async move { door.unlock(&UnlockRequest::default()).await };
    let result = tokio::time::timeout(Duration::from_secs(3), cycle).await;
    assert!(result.is_err());

    assert!(!hw.relay_on());
    assert!(!hw.pwm_running());
    assert_eq!(hw.events().last(), Some(&HardwareEvent::Relay(false)));
}

#[tokio::test]
async fn test_shutdown_deasserts_outputs() {
    let clock = Arc::new(ManualClock::new());
    let hw = SimulatedHardware::new(clock.clone());
    let mut door = controller(clock, hw.clone(), RecordingPlayer::default());

    door.shutdown().unwrap();
    assert_eq!(
        hw.events(),
        vec![HardwareEvent::PwmStop, HardwareEvent::Relay(false)]
    );
    assert_eq!(door.state(), LockState::Locked);
}
