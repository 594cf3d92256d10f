//! Shared rig for integration tests.
//!
//! A simulated board with a fast wing mechanism (20 ms between
//! end-stops) and an actuator with short watchdog/calibration windows,
//! so a full test stays well under a second.

use std::sync::Arc;
use std::time::Duration;

use tuxeatpi::config::{SimConfig, TransmissionConfig, WingsConfig};
use tuxeatpi::drivers::motor::Direction;
use tuxeatpi::drivers::sim::{RigStart, SimBoard};
use tuxeatpi::events::{Event, EventChannel};
use tuxeatpi::pins::PinAssignment;
use tuxeatpi::wings::WingActuator;

pub const TRAVEL_MS: u32 = 20;
pub const WATCHDOG_MS: u32 = 500;
pub const CALIBRATION_MS: u32 = 1_000;

/// Upper bound for any queued movement in these tests.
pub const SETTLE: Duration = Duration::from_secs(5);

pub fn wings_config() -> WingsConfig {
    WingsConfig {
        component: "FakeWings".into(),
        pins: PinAssignment::default(),
        default_direction: Direction::Down,
        calibration_timeout_ms: CALIBRATION_MS,
        watchdog_timeout_ms: WATCHDOG_MS,
    }
}

pub fn sim_config(start: RigStart) -> SimConfig {
    SimConfig {
        travel_ms: TRAVEL_MS,
        start,
    }
}

pub fn transmission_config(answer_timeout_ms: u32) -> TransmissionConfig {
    TransmissionConfig {
        answer_timeout_ms,
        poll_interval_ms: 10,
    }
}

pub struct Rig {
    pub board: Arc<SimBoard>,
    pub events: Arc<EventChannel>,
    pub wings: WingActuator,
}

#[allow(dead_code)]
impl Rig {
    /// Calibrated actuator on a board whose wing starts at `start`.
    pub fn new(start: RigStart) -> Self {
        let cfg = wings_config();
        let board = Arc::new(SimBoard::with_wing_rig(&cfg.pins, &sim_config(start)).unwrap());
        let events = Arc::new(EventChannel::new());
        let wings = WingActuator::new(board.clone(), &cfg, events.clone()).unwrap();
        Self {
            board,
            events,
            wings,
        }
    }

    pub fn settle(&self) {
        assert!(self.wings.wait_idle(SETTLE), "actuator never went idle");
    }

    pub fn drain_events(&self) -> Vec<Event> {
        let mut out = Vec::new();
        self.events.drain(|e| out.push(e));
        out
    }
}
