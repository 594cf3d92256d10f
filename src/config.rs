//! System configuration parameters
//!
//! All tunable parameters for the TuxEatPi core.  Values are passed
//! explicitly into the actuator, broker and aptitudes at construction;
//! nothing reads ambient global settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::motor::Direction;
use crate::drivers::sim::RigStart;
use crate::error::ConfigError;
use crate::pins::PinAssignment;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Identity ---
    /// Robot name reported by the `being` aptitude
    pub name: String,
    /// Birth date reported by the `being` aptitude (free-form, ISO 8601 recommended)
    pub birthday: String,

    pub wings: WingsConfig,
    pub transmission: TransmissionConfig,
    pub sim: SimConfig,
}

/// Wing actuator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WingsConfig {
    /// Component name stamped on every switch event
    pub component: String,
    /// Pin wiring
    pub pins: PinAssignment,
    /// Direction used for calibration and timed moves
    pub default_direction: Direction,
    /// Maximum time to find an end-stop during calibration (milliseconds)
    pub calibration_timeout_ms: u32,
    /// Maximum time a single activation may take (milliseconds)
    pub watchdog_timeout_ms: u32,
}

/// Transmission protocol parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// How long `order(.., block = true)` waits for an answer (milliseconds)
    pub answer_timeout_ms: u32,
    /// Run-loop poll interval between inbound messages (milliseconds)
    pub poll_interval_ms: u32,
}

/// Simulated wing mechanics (sim board only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Time for the wing to travel between end-stops (milliseconds)
    pub travel_ms: u32,
    /// Physical wing position at power-up
    pub start: RigStart,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "Tux".into(),
            birthday: "2016-01-01T00:00:00".into(),
            wings: WingsConfig::default(),
            transmission: TransmissionConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Default for WingsConfig {
    fn default() -> Self {
        Self {
            component: "Wings".into(),
            pins: PinAssignment::default(),
            default_direction: Direction::Down,
            calibration_timeout_ms: 5_000,
            watchdog_timeout_ms: 2_000,
        }
    }
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            answer_timeout_ms: 5_000,
            poll_interval_ms: 50,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            travel_ms: 400,
            start: RigStart::Between,
        }
    }
}

impl WingsConfig {
    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.calibration_timeout_ms))
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.watchdog_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pins.validate()?;
        if self.component.is_empty() {
            return Err(ConfigError::ValidationFailed("wings.component must not be empty"));
        }
        if self.component.len() > crate::events::COMPONENT_NAME_CAP {
            return Err(ConfigError::ValidationFailed("wings.component too long"));
        }
        if self.calibration_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("wings.calibration_timeout_ms must be > 0"));
        }
        if self.watchdog_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("wings.watchdog_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

impl TransmissionConfig {
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.answer_timeout_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms))
    }
}

impl SimConfig {
    pub fn travel(&self) -> Duration {
        Duration::from_millis(u64::from(self.travel_ms))
    }
}

impl SystemConfig {
    /// Range-check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wings.validate()?;
        if self.transmission.answer_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "transmission.answer_timeout_ms must be > 0",
            ));
        }
        if self.transmission.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "transmission.poll_interval_ms must be > 0",
            ));
        }
        if self.sim.travel_ms >= self.wings.watchdog_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "sim.travel_ms must be shorter than the watchdog",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.  Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_json(&text)
    }
}
