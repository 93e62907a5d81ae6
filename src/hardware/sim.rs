use super::{Direction, DoorHardware, Endstop, PwmSettings};
use crate::clock::Clock;
use crate::error::HardwareError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Output change recorded by [`SimulatedHardware`]
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    Relay(bool),
    Direction(Direction),
    PwmStart(PwmSettings),
    PwmStop,
}

/// In-memory lock mechanism.
///
/// Clones share state, so a test can keep one handle while the
/// controller owns another. The bolt reaches the open end stop
/// `open_after` into an opening run and the closed end stop
/// `closed_after` into a closing run; `None` means that switch never
/// fires.
#[derive(Clone)]
pub struct SimulatedHardware {
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SimState>>,
}

struct SimState {
    relay: bool,
    direction: Direction,
    pwm: Option<PwmSettings>,
    motor_started: Option<Instant>,
    bolt_open: bool,
    bolt_closed: bool,
    open_after: Option<Duration>,
    closed_after: Option<Duration>,
    fail_at_write: Option<usize>,
    writes: usize,
    limit_reads: usize,
    history: Vec<(Duration, HardwareEvent)>,
    origin: Instant,
}

impl SimulatedHardware {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let origin = clock.now();
        Self {
            clock,
            state: Arc::new(Mutex::new(SimState {
                relay: false,
                direction: Direction::Close,
                pwm: None,
                motor_started: None,
                bolt_open: false,
                bolt_closed: true,
                open_after: None,
                closed_after: None,
                fail_at_write: None,
                writes: 0,
                limit_reads: 0,
                history: Vec::new(),
                origin,
            })),
        }
    }

    /// Open end stop fires this long after the motor starts opening
    pub fn with_open_after(self, after: Duration) -> Self {
        self.state.lock().open_after = Some(after);
        self
    }

    /// Closed end stop fires this long after the motor starts closing
    pub fn with_closed_after(self, after: Duration) -> Self {
        self.state.lock().closed_after = Some(after);
        self
    }

    /// Start with the bolt retracted, as after a crash mid-cycle
    pub fn with_bolt_open(self) -> Self {
        {
            let mut state = self.state.lock();
            state.bolt_open = true;
            state.bolt_closed = false;
        }
        self
    }

    /// Make output write number `index` (zero based) fail once
    pub fn fail_at_write(self, index: usize) -> Self {
        self.state.lock().fail_at_write = Some(index);
        self
    }

    pub fn relay_on(&self) -> bool {
        self.state.lock().relay
    }

    pub fn pwm_running(&self) -> bool {
        self.state.lock().pwm.is_some()
    }

    pub fn direction(&self) -> Direction {
        self.state.lock().direction
    }

    pub fn bolt_open(&self) -> bool {
        self.state.lock().bolt_open
    }

    /// Number of output writes attempted, including failed ones
    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    pub fn limit_reads(&self) -> usize {
        self.state.lock().limit_reads
    }

    pub fn events(&self) -> Vec<HardwareEvent> {
        self.state.lock().history.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Events with their offset from creation on the simulation clock
    pub fn timeline(&self) -> Vec<(Duration, HardwareEvent)> {
        self.state.lock().history.clone()
    }

    fn write(&self, line: &'static str, event: HardwareEvent) -> Result<(), HardwareError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let index = state.writes;
        state.writes += 1;

        if state.fail_at_write == Some(index) {
            state.fail_at_write = None;
            debug!("Simulated fault on {} (write #{})", line, index);
            return Err(HardwareError::Injected { line });
        }

        match &event {
            HardwareEvent::Relay(on) => state.relay = *on,
            HardwareEvent::Direction(direction) => state.direction = *direction,
            HardwareEvent::PwmStart(settings) => {
                state.pwm = Some(*settings);
                state.motor_started = Some(now);
                if state.direction == Direction::Close {
                    state.bolt_open = false;
                } else {
                    state.bolt_closed = false;
                }
            }
            HardwareEvent::PwmStop => {
                state.pwm = None;
                state.motor_started = None;
            }
        }

        let offset = now.saturating_duration_since(state.origin);
        state.history.push((offset, event));
        Ok(())
    }
}

impl DoorHardware for SimulatedHardware {
    fn set_relay(&mut self, on: bool) -> Result<(), HardwareError> {
        self.write("relay", HardwareEvent::Relay(on))
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), HardwareError> {
        self.write("direction", HardwareEvent::Direction(direction))
    }

    fn start_pwm(&mut self, settings: PwmSettings) -> Result<(), HardwareError> {
        self.write("pwm", HardwareEvent::PwmStart(settings))
    }

    fn stop_pwm(&mut self) -> Result<(), HardwareError> {
        self.write("pwm", HardwareEvent::PwmStop)
    }

    fn limit_reached(&mut self, endstop: Endstop) -> Result<bool, HardwareError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.limit_reads += 1;

        // Motor only moves the bolt while the relay powers it
        if let (Some(started), true) = (state.motor_started, state.relay) {
            let running = now.saturating_duration_since(started);
            match state.direction {
                Direction::Open => {
                    if state.open_after.is_some_and(|after| running >= after) {
                        state.bolt_open = true;
                    }
                }
                Direction::Close => {
                    if state.closed_after.is_some_and(|after| running >= after) {
                        state.bolt_closed = true;
                    }
                }
            }
        }

        Ok(match endstop {
            Endstop::Open => state.bolt_open,
            Endstop::Closed => state.closed_after.is_some() && state.bolt_closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn pwm() -> PwmSettings {
        PwmSettings {
            frequency_hz: 500.0,
            duty_percent: 50.0,
        }
    }

    #[tokio::test]
    async fn test_open_endstop_fires_after_delay() {
        let clock = Arc::new(ManualClock::new());
        let handle = SimulatedHardware::new(clock.clone()).with_open_after(Duration::from_secs(2));
        let mut hw = handle.clone();

        hw.set_relay(true).unwrap();
        hw.set_direction(Direction::Open).unwrap();
        hw.start_pwm(pwm()).unwrap();
        assert!(!hw.limit_reached(Endstop::Open).unwrap());

        clock.sleep(Duration::from_secs(2)).await;
        assert!(hw.limit_reached(Endstop::Open).unwrap());
        assert!(handle.bolt_open());
    }

    #[test]
    fn test_unpowered_motor_does_not_move() {
        let clock = Arc::new(ManualClock::new());
        let mut hw = SimulatedHardware::new(clock.clone()).with_open_after(Duration::ZERO);

        hw.set_direction(Direction::Open).unwrap();
        hw.start_pwm(pwm()).unwrap();
        clock.advance(Duration::from_secs(5));
        assert!(!hw.limit_reached(Endstop::Open).unwrap());
    }

    #[test]
    fn test_closed_endstop_absent_never_fires() {
        let clock = Arc::new(ManualClock::new());
        let mut hw = SimulatedHardware::new(clock.clone());
        assert!(!hw.limit_reached(Endstop::Closed).unwrap());
    }

    #[test]
    fn test_injected_fault_is_one_shot() {
        let clock = Arc::new(ManualClock::new());
        let handle = SimulatedHardware::new(clock).fail_at_write(1);
        let mut hw = handle.clone();

        hw.set_relay(true).unwrap();
        assert_eq!(
            hw.set_direction(Direction::Open),
            Err(HardwareError::Injected { line: "direction" })
        );
        hw.safe_outputs().unwrap();
        assert!(!handle.relay_on());
        assert_eq!(handle.writes(), 4);
        assert_eq!(
            handle.events(),
            vec![
                HardwareEvent::Relay(true),
                HardwareEvent::PwmStop,
                HardwareEvent::Relay(false)
            ]
        );
    }
}
