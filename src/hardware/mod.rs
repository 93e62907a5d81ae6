//! Relay, motor and limit-switch lines.
//!
//! [`DoorHardware`] is the only way the rest of the crate touches the
//! lock mechanism. Two backends exist: [`GpioHardware`] drives the real
//! pins through `rppal` (behind the `gpio` feature) and
//! [`SimulatedHardware`] keeps everything in memory for tests and
//! `--simulate` runs.

#[cfg(all(feature = "gpio", target_os = "linux"))]
mod gpio;
mod sim;

#[cfg(all(feature = "gpio", target_os = "linux"))]
pub use gpio::GpioHardware;
pub use sim::{HardwareEvent, SimulatedHardware};

use crate::clock::Clock;
use crate::config::{DoorConfig, PinConfig};
use crate::error::HardwareError;
use std::sync::Arc;
use tracing::info;

/// Motor direction; `Open` drives the direction line HIGH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Open,
    Close,
}

/// End positions reported by the limit switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endstop {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PwmSettings {
    pub frequency_hz: f64,
    pub duty_percent: f64,
}

impl PwmSettings {
    pub fn from_config(config: &DoorConfig) -> Self {
        Self {
            frequency_hz: config.pwm_frequency_hz,
            duty_percent: config.pwm_duty_percent,
        }
    }
}

/// Capability set over the lock's output and input lines
pub trait DoorHardware: Send {
    /// Drive the motor power relay (true = HIGH)
    fn set_relay(&mut self, on: bool) -> Result<(), HardwareError>;

    fn set_direction(&mut self, direction: Direction) -> Result<(), HardwareError>;

    fn start_pwm(&mut self, settings: PwmSettings) -> Result<(), HardwareError>;

    fn stop_pwm(&mut self) -> Result<(), HardwareError>;

    /// Whether the switch for `endstop` is pressed
    fn limit_reached(&mut self, endstop: Endstop) -> Result<bool, HardwareError>;

    /// Deassert every output. Both steps are always attempted.
    fn safe_outputs(&mut self) -> Result<(), HardwareError> {
        let pwm = self.stop_pwm();
        let relay = self.set_relay(false);
        pwm.and(relay)
    }
}

/// Acquire the hardware backend selected at startup
pub fn open_hardware(
    pins: &PinConfig,
    simulate: bool,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn DoorHardware>, HardwareError> {
    if simulate {
        info!("Using simulated door hardware");
        return Ok(Box::new(SimulatedHardware::new(clock).with_open_after(
            std::time::Duration::from_secs(2),
        )));
    }

    open_gpio(pins)
}

#[cfg(all(feature = "gpio", target_os = "linux"))]
fn open_gpio(pins: &PinConfig) -> Result<Box<dyn DoorHardware>, HardwareError> {
    let hardware = GpioHardware::new(pins)?;
    info!(
        "GPIO initialized (relay={}, direction={}, pwm={}, open_limit={}, closed_limit={:?})",
        pins.relay, pins.direction, pins.pwm, pins.open_limit, pins.closed_limit
    );
    Ok(Box::new(hardware))
}

#[cfg(not(all(feature = "gpio", target_os = "linux")))]
fn open_gpio(_pins: &PinConfig) -> Result<Box<dyn DoorHardware>, HardwareError> {
    Err(HardwareError::Unavailable(
        "built without the `gpio` feature; run with --simulate".to_string(),
    ))
}
