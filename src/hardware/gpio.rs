use super::{Direction, DoorHardware, Endstop, PwmSettings};
use crate::config::PinConfig;
use crate::error::HardwareError;
use rppal::gpio::{Gpio, InputPin, OutputPin};
use tracing::{debug, warn};

/// Lock mechanism wired to the Raspberry Pi header.
///
/// Outputs come up LOW. Limit switches are pulled up and read as
/// pressed when the line is LOW.
pub struct GpioHardware {
    relay: OutputPin,
    direction: OutputPin,
    pwm: OutputPin,
    open_limit: InputPin,
    closed_limit: Option<InputPin>,
}

impl GpioHardware {
    pub fn new(pins: &PinConfig) -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(|e| gpio_error("gpio", e))?;

        let relay = gpio
            .get(pins.relay)
            .map_err(|e| gpio_error("relay", e))?
            .into_output_low();
        let direction = gpio
            .get(pins.direction)
            .map_err(|e| gpio_error("direction", e))?
            .into_output_low();
        let pwm = gpio
            .get(pins.pwm)
            .map_err(|e| gpio_error("pwm", e))?
            .into_output_low();
        let open_limit = gpio
            .get(pins.open_limit)
            .map_err(|e| gpio_error("open_limit", e))?
            .into_input_pullup();
        let closed_limit = match pins.closed_limit {
            Some(pin) => Some(
                gpio.get(pin)
                    .map_err(|e| gpio_error("closed_limit", e))?
                    .into_input_pullup(),
            ),
            None => None,
        };

        Ok(Self {
            relay,
            direction,
            pwm,
            open_limit,
            closed_limit,
        })
    }
}

fn gpio_error(line: &'static str, error: rppal::gpio::Error) -> HardwareError {
    HardwareError::Gpio {
        line,
        details: error.to_string(),
    }
}

impl DoorHardware for GpioHardware {
    fn set_relay(&mut self, on: bool) -> Result<(), HardwareError> {
        if on {
            self.relay.set_high();
        } else {
            self.relay.set_low();
        }
        Ok(())
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), HardwareError> {
        match direction {
            Direction::Open => self.direction.set_high(),
            Direction::Close => self.direction.set_low(),
        }
        Ok(())
    }

    fn start_pwm(&mut self, settings: PwmSettings) -> Result<(), HardwareError> {
        debug!(
            "Starting software PWM at {} Hz, {}% duty",
            settings.frequency_hz, settings.duty_percent
        );
        self.pwm
            .set_pwm_frequency(settings.frequency_hz, settings.duty_percent / 100.0)
            .map_err(|e| gpio_error("pwm", e))
    }

    fn stop_pwm(&mut self) -> Result<(), HardwareError> {
        let result = self.pwm.clear_pwm().map_err(|e| gpio_error("pwm", e));
        self.pwm.set_low();
        result
    }

    fn limit_reached(&mut self, endstop: Endstop) -> Result<bool, HardwareError> {
        Ok(match endstop {
            Endstop::Open => self.open_limit.is_low(),
            Endstop::Closed => self
                .closed_limit
                .as_ref()
                .map(|pin| pin.is_low())
                .unwrap_or(false),
        })
    }
}

impl Drop for GpioHardware {
    fn drop(&mut self) {
        if let Err(e) = self.safe_outputs() {
            warn!("Failed to safe GPIO outputs on release: {}", e);
        }
    }
}
