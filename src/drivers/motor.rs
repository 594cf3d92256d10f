//! Reversible wing motor driver (H-bridge enable + direction).
//!
//! Two digital outputs: the `movement` line energises the motor, the
//! `position` line selects the direction of travel (HIGH = toward up).
//!
//! ## Safety contract
//!
//! The driver is a dumb actuator.  It never decides when to stop; the
//! wing actuator halts it from the limit-switch callback or its
//! watchdog.
//!
//! Generic over `embedded-hal` output pins so it runs unchanged on a
//! real board or the simulation board.

use embedded_hal::digital::{Error as _, OutputPin, PinState};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::PinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Level of the direction line for this direction.
    pub fn pin_state(self) -> PinState {
        PinState::from(matches!(self, Self::Up))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Stopped,
    Running(Direction),
}

pub struct WingMotor<EN, DIR> {
    enable: EN,
    direction: DIR,
    state: MotorState,
}

impl<EN, DIR> WingMotor<EN, DIR>
where
    EN: OutputPin,
    DIR: OutputPin,
{
    /// Take ownership of the two lines and force the motor off.
    pub fn new(enable: EN, direction: DIR) -> Result<Self, PinError> {
        let mut motor = Self {
            enable,
            direction,
            state: MotorState::Running(Direction::Down),
        };
        motor.stop()?;
        Ok(motor)
    }

    /// Energise the motor toward `dir`.  Direction is latched before the
    /// enable line goes high.
    pub fn run(&mut self, dir: Direction) -> Result<(), PinError> {
        self.direction
            .set_state(dir.pin_state())
            .map_err(|e| hal_error(&e))?;
        self.enable.set_high().map_err(|e| hal_error(&e))?;
        self.state = MotorState::Running(dir);
        debug!("motor: running {:?}", dir);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), PinError> {
        self.enable.set_low().map_err(|e| hal_error(&e))?;
        if self.state != MotorState::Stopped {
            debug!("motor: stopped");
        }
        self.state = MotorState::Stopped;
        Ok(())
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, MotorState::Stopped)
    }
}

fn hal_error<E: embedded_hal::digital::Error>(e: &E) -> PinError {
    log::warn!("motor: HAL error {:?}", e.kind());
    PinError::Hal
}
