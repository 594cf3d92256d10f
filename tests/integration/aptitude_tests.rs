//! Aptitudes hosted on threads and in child processes.

use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tuxeatpi::Error;
use tuxeatpi::aptitudes::being::BeingAptitude;
use tuxeatpi::aptitudes::wings::WingsAptitude;
use tuxeatpi::aptitudes::{Aptitude, OrderRequest, Orders, SubprocessedAptitude};
use tuxeatpi::config::SystemConfig;
use tuxeatpi::drivers::sim::RigStart;
use tuxeatpi::transmission::TransmissionBroker;

use crate::harness::{Rig, transmission_config};

/// Greets by asking `being` for the robot's name.
struct Greeter;

impl Aptitude for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn handle(
        &mut self,
        action: &str,
        _arguments: &Value,
        orders: &mut Orders<'_>,
    ) -> tuxeatpi::Result<Value> {
        match action {
            "hello" => {
                let answer = orders.order("aptitudes.being.get_name", json!({}), true);
                let name = answer
                    .as_ref()
                    .and_then(|a| a["result"].as_str())
                    .unwrap_or("nobody");
                Ok(json!(format!("hello from {name}")))
            }
            other => Err(Error::UnknownCommand(other.into())),
        }
    }
}

fn wings_aptitude(broker: &Arc<TransmissionBroker>) -> SubprocessedAptitude {
    let rig = Rig::new(RigStart::Between);
    SubprocessedAptitude::spawn(
        Box::new(WingsAptitude::new(rig.wings)),
        broker.clone(),
        &transmission_config(3_000),
    )
    .unwrap()
}

#[test]
fn wings_over_the_protocol() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(3_000)));
    let wings = wings_aptitude(&broker);

    assert_eq!(
        wings.order("wings.get_position", json!({}), true),
        Some(json!({"result": "down"}))
    );
    assert_eq!(
        wings.order("wings.move_to_position", json!({"position": "up"}), true),
        Some(json!({"result": "up"}))
    );
    assert_eq!(
        wings.order("wings.wait_idle", json!({"seconds": 2}), true),
        Some(json!({"result": true}))
    );
    assert_eq!(
        wings.order("aptitudes.wings.get_position", json!({}), true),
        Some(json!({"result": "up"}))
    );

    let bad = wings
        .order("wings.move_to_position", json!({"position": "bottom"}), true)
        .unwrap();
    assert!(bad["error"].as_str().unwrap().contains("invalid target"));

    let missing = wings.order("wings.move_count", json!({}), true).unwrap();
    assert!(missing["error"].as_str().unwrap().contains("count"));

    let unknown = wings.order("wings.fly", json!({}), true).unwrap();
    assert!(unknown["error"].as_str().unwrap().contains("unknown command"));
}

#[test]
fn wings_events_drained_over_the_protocol() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(3_000)));
    let wings = wings_aptitude(&broker);

    // Calibration closure first.
    let first = wings.order("wings.events", json!({}), true).unwrap();
    assert_eq!(first["result"][0]["name"], "right_switch");

    wings.order("wings.push_wing", json!({"side": "left"}), true);
    let deadline = Instant::now() + Duration::from_secs(2);
    let events = loop {
        let got = wings.order("wings.events", json!({}), true).unwrap();
        if got["result"].as_array().is_some_and(|a| !a.is_empty()) || Instant::now() > deadline {
            break got;
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(events["result"][0]["name"], "left_switch");
    assert_eq!(events["result"][0]["pin_id"], 17);
    assert_eq!(events["result"][0]["component"], "FakeWings");
}

#[test]
fn order_request_defaults_to_blocking() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(3_000)));
    let being = SubprocessedAptitude::spawn(
        Box::new(BeingAptitude::new(&SystemConfig::default())),
        broker.clone(),
        &transmission_config(3_000),
    )
    .unwrap();

    let request: OrderRequest =
        serde_json::from_value(json!({"command": "being.get_name"})).unwrap();
    assert_eq!(being.order_request(request), Some(json!({"result": "Tux"})));

    let fire_and_forget: OrderRequest =
        serde_json::from_value(json!({"command": "being.get_name", "block": false})).unwrap();
    assert_eq!(being.order_request(fire_and_forget), None);
}

#[test]
fn order_to_missing_aptitude_times_out() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(100)));
    let being = SubprocessedAptitude::spawn(
        Box::new(BeingAptitude::new(&SystemConfig::default())),
        broker.clone(),
        &transmission_config(100),
    )
    .unwrap();

    let start = Instant::now();
    assert_eq!(being.order("ghost.walk", json!({}), true), None);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn being_in_a_child_process() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(5_000)));
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tuxeatpi"));
    cmd.args(["aptitude", "being"]);
    let mut being = SubprocessedAptitude::spawn_process("being", cmd, broker.clone()).unwrap();
    assert_eq!(broker.routes(), vec!["being".to_owned()]);

    assert_eq!(
        being.order("aptitudes.being.get_name", json!({}), true),
        Some(json!({"result": "Tux"}))
    );
    let uptime = being.order("being.get_uptime", json!({}), true).unwrap();
    assert_eq!(uptime["result"]["days"], 0);

    being.shutdown();
    assert!(broker.routes().is_empty());
}

#[test]
fn wings_in_a_child_process() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(5_000)));
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tuxeatpi"));
    cmd.args(["aptitude", "wings"]);
    let wings = SubprocessedAptitude::spawn_process("wings", cmd, broker.clone()).unwrap();

    assert_eq!(
        wings.order("wings.get_position", json!({}), true),
        Some(json!({"result": "down"}))
    );
    assert_eq!(
        wings.order("wings.move_count", json!({"count": 1}), true),
        Some(json!({"result": 1}))
    );
    assert_eq!(
        wings.order("wings.wait_idle", json!({"seconds": 3}), true),
        Some(json!({"result": true}))
    );
    assert_eq!(
        wings.order("wings.get_position", json!({}), true),
        Some(json!({"result": "up"}))
    );
}

#[test]
fn worker_orders_sibling_in_child_process() {
    let broker = Arc::new(TransmissionBroker::new(&transmission_config(5_000)));
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tuxeatpi"));
    cmd.args(["aptitude", "being"]);
    let _being = SubprocessedAptitude::spawn_process("being", cmd, broker.clone()).unwrap();
    let greeter = SubprocessedAptitude::spawn(
        Box::new(Greeter),
        broker.clone(),
        &transmission_config(5_000),
    )
    .unwrap();

    assert_eq!(
        greeter.order("greeter.hello", json!({}), true),
        Some(json!({"result": "hello from Tux"}))
    );
    // Relayed entries are retired once answered.
    assert_eq!(broker.pending_count(), 0);
}
