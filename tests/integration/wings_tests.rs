//! Wing actuator against the simulated mechanism.

use std::sync::Arc;
use std::time::Duration;

use tuxeatpi::drivers::sim::{RigStart, SimBoard};
use tuxeatpi::error::{ConfigError, Error};
use tuxeatpi::events::EventChannel;
use tuxeatpi::wings::{COMMAND_QUEUE_DEPTH, Side, WingActuator, WingState};

use crate::harness::{Rig, SETTLE, WATCHDOG_MS, sim_config, wings_config};

// ── Calibration ───────────────────────────────────────────────

#[test]
fn calibration_drives_down_from_midway() {
    let rig = Rig::new(RigStart::Between);
    assert_eq!(rig.wings.get_position(), WingState::Down);
    assert_eq!(rig.wings.state(), WingState::Down);
    assert!(!rig.wings.is_moving());
    assert!(rig.wings.switch_closed(Side::Right).unwrap());

    // The calibration closure is a switch event like any other.
    let events = rig.drain_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "right_switch");
    assert_eq!(events[0].pin_id, 4);
}

#[test]
fn calibration_adopts_closed_switch_without_moving() {
    let rig = Rig::new(RigStart::Up);
    assert_eq!(rig.wings.get_position(), WingState::Up);
    assert_eq!(rig.board.motor_starts(), 0);
    assert!(rig.events.is_empty());
}

#[test]
fn calibration_fails_without_mechanism() {
    let mut cfg = wings_config();
    cfg.calibration_timeout_ms = 100;
    let board = Arc::new(SimBoard::new().unwrap());
    let result = WingActuator::new(board, &cfg, Arc::new(EventChannel::new()));
    assert!(matches!(
        result,
        Err(Error::Calibration { timeout_ms: 100 })
    ));
}

#[test]
fn uncalibrated_actuator_rejects_movement() {
    let mut cfg = wings_config();
    cfg.calibration_timeout_ms = 100;
    let board = Arc::new(SimBoard::new().unwrap());
    let wings =
        WingActuator::uncalibrated(board.clone(), &cfg, Arc::new(EventChannel::new())).unwrap();
    assert_eq!(wings.get_position(), WingState::Unknown);

    assert!(wings.recalibrate().is_err());
    assert_eq!(wings.get_position(), WingState::Unknown);
    assert!(!wings.is_moving());

    assert_eq!(wings.move_to_position(WingState::Up), Err(Error::NotCalibrated));
    assert_eq!(wings.move_count(3), Err(Error::NotCalibrated));
    assert_eq!(
        wings.move_time(Duration::from_millis(10)),
        Err(Error::NotCalibrated)
    );
}

#[test]
fn recalibration_recovers_once_switch_closes() {
    let cfg = wings_config();
    let board = Arc::new(
        SimBoard::with_wing_rig(&cfg.pins, &sim_config(RigStart::Between)).unwrap(),
    );
    let wings =
        WingActuator::uncalibrated(board, &cfg, Arc::new(EventChannel::new())).unwrap();
    assert_eq!(wings.get_position(), WingState::Unknown);
    assert_eq!(wings.recalibrate(), Ok(WingState::Down));
    assert_eq!(wings.get_position(), WingState::Down);
}

#[test]
fn duplicate_pins_are_a_config_error() {
    let mut cfg = wings_config();
    cfg.pins.right_switch = cfg.pins.left_switch;
    let board = Arc::new(SimBoard::new().unwrap());
    let result = WingActuator::new(board, &cfg, Arc::new(EventChannel::new()));
    assert!(matches!(
        result,
        Err(Error::Config(ConfigError::DuplicatePin(17)))
    ));
}

// ── Position moves ────────────────────────────────────────────

#[test]
fn up_then_down() {
    let rig = Rig::new(RigStart::Between);

    rig.wings.move_to_position(WingState::Up).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Up);
    assert!(rig.wings.switch_closed(Side::Left).unwrap());

    rig.wings.move_to_position(WingState::Down).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Down);
    assert!(!rig.wings.is_moving());
    assert_eq!(rig.wings.take_error(), None);
}

#[test]
fn move_to_current_position_is_a_no_op() {
    let rig = Rig::new(RigStart::Between);
    rig.drain_events();
    let starts = rig.board.motor_starts();

    rig.wings.move_to_position(WingState::Down).unwrap();
    rig.settle();

    assert_eq!(rig.board.motor_starts(), starts);
    assert_eq!(rig.wings.get_position(), WingState::Down);
    assert!(rig.events.is_empty());
}

#[test]
fn invalid_target_rejected_without_motion() {
    let rig = Rig::new(RigStart::Between);
    let starts = rig.board.motor_starts();

    assert_eq!(
        "bottom".parse::<WingState>(),
        Err(Error::InvalidTarget("bottom".into()))
    );
    assert!(matches!(
        rig.wings.move_to_position(WingState::Moving),
        Err(Error::InvalidTarget(_))
    ));
    assert!(matches!(
        rig.wings.move_to_position(WingState::Unknown),
        Err(Error::InvalidTarget(_))
    ));

    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Down);
    assert_eq!(rig.board.motor_starts(), starts);
}

// ── Count moves ───────────────────────────────────────────────

#[test]
fn move_count_parity_sequence() {
    let rig = Rig::new(RigStart::Between);
    assert_eq!(rig.wings.get_position(), WingState::Down);

    rig.wings.move_count(3).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Up);

    rig.wings.move_count(2).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Up);

    rig.wings.move_count(5).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Down);
    assert_eq!(rig.wings.take_error(), None);
}

#[test]
fn move_count_five_from_down_ends_up() {
    let rig = Rig::new(RigStart::Down);
    let starts = rig.board.motor_starts();
    rig.wings.move_count(5).unwrap();
    rig.settle();
    assert_eq!(rig.wings.get_position(), WingState::Up);
    assert_eq!(rig.board.motor_starts() - starts, 5);
}

#[test]
fn move_count_zero_does_nothing() {
    let rig = Rig::new(RigStart::Down);
    rig.wings.move_count(0).unwrap();
    rig.settle();
    assert_eq!(rig.board.motor_starts(), 0);
    assert_eq!(rig.wings.get_position(), WingState::Down);
}

#[test]
fn every_swing_emits_one_event_in_order() {
    let rig = Rig::new(RigStart::Down);
    rig.wings.move_count(4).unwrap();
    rig.settle();
    let names: Vec<&str> = rig.drain_events().iter().map(|e| e.name).collect();
    assert_eq!(
        names,
        vec!["left_switch", "right_switch", "left_switch", "right_switch"]
    );
}

#[test]
fn long_undrained_run_keeps_every_event() {
    let rig = Rig::new(RigStart::Down);
    rig.wings.move_count(70).unwrap();
    rig.settle();
    assert_eq!(rig.events.len(), 70);

    rig.wings.push_wing(Side::Left).unwrap();
    let events: Vec<_> = (0..71)
        .map_while(|_| rig.events.pop_timeout(Duration::from_secs(5)))
        .collect();
    assert_eq!(events.len(), 71);
    let lefts = events.iter().filter(|e| e.name == "left_switch").count();
    assert_eq!(lefts, 36);
    assert_eq!(events[70].name, "left_switch");
    assert_eq!(rig.events.pop_timeout(Duration::from_millis(50)), None);
}

// ── Timed moves ───────────────────────────────────────────────

#[test]
fn move_time_energises_for_the_window_only() {
    let rig = Rig::new(RigStart::Between);
    rig.wings.move_time(Duration::from_millis(300)).unwrap();

    std::thread::sleep(Duration::from_millis(100));
    assert!(rig.wings.is_moving());
    assert_eq!(rig.wings.state(), WingState::Moving);
    // Confirmed position is unaffected by the motor running.
    assert_eq!(rig.wings.get_position(), WingState::Down);

    std::thread::sleep(Duration::from_millis(400));
    assert!(!rig.wings.is_moving());
    assert_eq!(rig.wings.state(), WingState::Down);
}

#[test]
fn short_timed_move_then_return_drives_back() {
    // Default direction is down; the wing starts up.
    let rig = Rig::new(RigStart::Up);
    rig.wings.move_time(Duration::from_millis(5)).unwrap();
    rig.settle();

    assert!(!rig.wings.switch_closed(Side::Left).unwrap());
    assert!(!rig.wings.switch_closed(Side::Right).unwrap());
    assert_eq!(rig.wings.get_position(), WingState::Up);

    let starts = rig.board.motor_starts();
    rig.wings.move_to_position(WingState::Up).unwrap();
    rig.settle();
    assert_eq!(rig.board.motor_starts(), starts + 1);
    assert!(rig.wings.switch_closed(Side::Left).unwrap());
    assert_eq!(rig.wings.get_position(), WingState::Up);
    assert_eq!(rig.wings.take_error(), None);

    // Back on the end-stop: the same move is a no-op again.
    rig.wings.move_to_position(WingState::Up).unwrap();
    rig.settle();
    assert_eq!(rig.board.motor_starts(), starts + 1);
}

#[test]
fn wait_idle_respects_its_bound() {
    let rig = Rig::new(RigStart::Down);
    rig.wings.move_time(Duration::from_millis(300)).unwrap();
    assert!(!rig.wings.wait_idle(Duration::from_millis(50)));
    assert!(rig.wings.wait_idle(SETTLE));
    assert!(!rig.wings.is_moving());
}

// ── Switch events ─────────────────────────────────────────────

#[test]
fn push_wing_left_then_right() {
    let rig = Rig::new(RigStart::Between);
    rig.drain_events();

    rig.wings.push_wing(Side::Left).unwrap();
    let event = rig.events.pop_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.component.as_str(), "FakeWings");
    assert_eq!(event.pin_id, rig.wings.pins().left_switch);
    assert_eq!(event.name, "left_switch");

    rig.wings.push_wing(Side::Right).unwrap();
    let event = rig.events.pop_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(event.component.as_str(), "FakeWings");
    assert_eq!(event.pin_id, rig.wings.pins().right_switch);
    assert_eq!(event.name, "right_switch");
    assert!(event.timestamp_us > 0);

    // Exactly one event per closure.
    assert_eq!(rig.events.pop_timeout(Duration::from_millis(50)), None);
    // Synthetic closures while idle do not move the recorded state.
    assert_eq!(rig.wings.get_position(), WingState::Down);
}

// ── Faults ────────────────────────────────────────────────────

#[test]
fn stuck_actuator_detected_and_motor_halted() {
    let rig = Rig::new(RigStart::Between);
    rig.board.jam();

    rig.wings.move_to_position(WingState::Up).unwrap();
    rig.settle();

    assert_eq!(
        rig.wings.take_error(),
        Some(Error::StuckActuator {
            target: WingState::Up,
            timeout_ms: WATCHDOG_MS
        })
    );
    assert_eq!(rig.wings.take_error(), None);
    assert!(!rig.wings.is_moving());
    assert_eq!(rig.wings.get_position(), WingState::Down);
}

#[test]
fn full_queue_reports_busy() {
    let rig = Rig::new(RigStart::Between);
    rig.board.jam();

    let results: Vec<_> = (0..COMMAND_QUEUE_DEPTH + 4)
        .map(|_| rig.wings.move_to_position(WingState::Up))
        .collect();
    assert!(results.iter().any(|r| *r == Err(Error::Busy)));
    assert!(results.iter().take(COMMAND_QUEUE_DEPTH).all(Result::is_ok));
}
