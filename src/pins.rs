//! GPIO pin assignments for the wing mechanism.
//!
//! Single source of truth for the default wiring: every default in
//! [`PinAssignment`] references the constants below rather than
//! hard-coding pin numbers.  The assignment itself is immutable once an
//! actuator has been built from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Limit switches (active-low, falling edge on closure)
// ---------------------------------------------------------------------------

/// End-stop switch closed when the wing reaches the **up** position.
pub const LEFT_SWITCH_GPIO: i32 = 17;
/// End-stop switch closed when the wing reaches the **down** position.
pub const RIGHT_SWITCH_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Wing motor (reversible, H-bridge)
// ---------------------------------------------------------------------------

/// Digital output: HIGH = drive toward up, LOW = drive toward down.
pub const POSITION_GPIO: i32 = 25;
/// Digital output: HIGH = motor energised.
pub const MOVEMENT_GPIO: i32 = 22;

/// Highest pin number accepted by the validator (BCM numbering).
pub const MAX_GPIO: i32 = 53;

/// Logical role of a pin within the wing mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinRole {
    LeftSwitch,
    RightSwitch,
    Position,
    Movement,
}

impl PinRole {
    pub const ALL: [PinRole; 4] = [
        PinRole::LeftSwitch,
        PinRole::RightSwitch,
        PinRole::Position,
        PinRole::Movement,
    ];

    /// Name used in configuration maps and emitted events.
    pub const fn name(self) -> &'static str {
        match self {
            Self::LeftSwitch => "left_switch",
            Self::RightSwitch => "right_switch",
            Self::Position => "position",
            Self::Movement => "movement",
        }
    }
}

/// Mapping of logical roles to physical pin identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinAssignment {
    pub left_switch: i32,
    pub right_switch: i32,
    pub position: i32,
    pub movement: i32,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            left_switch: LEFT_SWITCH_GPIO,
            right_switch: RIGHT_SWITCH_GPIO,
            position: POSITION_GPIO,
            movement: MOVEMENT_GPIO,
        }
    }
}

impl PinAssignment {
    /// Build an assignment from a role-name → pin map, e.g.
    /// `{"left_switch": 17, "right_switch": 4, "position": 25, "movement": 22}`.
    ///
    /// Unknown keys are ignored; every role must be present.
    pub fn from_map(map: &HashMap<String, i32>) -> Result<Self, ConfigError> {
        let get = |role: PinRole| {
            map.get(role.name())
                .copied()
                .ok_or(ConfigError::MissingPin(role.name()))
        };
        let pins = Self {
            left_switch: get(PinRole::LeftSwitch)?,
            right_switch: get(PinRole::RightSwitch)?,
            position: get(PinRole::Position)?,
            movement: get(PinRole::Movement)?,
        };
        pins.validate()?;
        Ok(pins)
    }

    /// Physical pin for a logical role.
    pub fn pin(&self, role: PinRole) -> i32 {
        match role {
            PinRole::LeftSwitch => self.left_switch,
            PinRole::RightSwitch => self.right_switch,
            PinRole::Position => self.position,
            PinRole::Movement => self.movement,
        }
    }

    /// Reverse lookup: which role a physical pin plays, if any.
    pub fn role_of(&self, pin: i32) -> Option<PinRole> {
        PinRole::ALL.into_iter().find(|&r| self.pin(r) == pin)
    }

    /// Every pin must be in range and used by exactly one role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in PinRole::ALL {
            let pin = self.pin(role);
            if !(0..=MAX_GPIO).contains(&pin) {
                return Err(ConfigError::InvalidPin {
                    role: role.name(),
                    pin,
                });
            }
        }
        for (i, a) in PinRole::ALL.iter().enumerate() {
            for b in &PinRole::ALL[i + 1..] {
                if self.pin(*a) == self.pin(*b) {
                    return Err(ConfigError::DuplicatePin(self.pin(*a)));
                }
            }
        }
        Ok(())
    }
}
