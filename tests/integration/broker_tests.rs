//! Transmission broker under concurrent waiters and answerers.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tuxeatpi::transmission::{Status, TransmissionBroker};

use crate::harness::transmission_config;

fn broker() -> Arc<TransmissionBroker> {
    Arc::new(TransmissionBroker::new(&transmission_config(1_000)))
}

#[test]
fn answer_from_another_thread_wakes_waiter() {
    let b = broker();
    let t = b.create_transmission("order", "being.get_name", json!({}));

    let answerer = {
        let b = b.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            assert!(b.deliver_answer(t.id, json!({"result": "Tux"})));
        })
    };

    let answer = b.wait_for_answer(t.id, Duration::from_secs(5)).unwrap();
    assert_eq!(answer.id, t.id);
    assert_eq!(answer.content, json!({"result": "Tux"}));
    answerer.join().unwrap();
}

#[test]
fn unanswered_wait_returns_none_within_bound() {
    let b = broker();
    let t = b.create_transmission("order", "nobody.home", Value::Null);

    let start = Instant::now();
    assert_eq!(b.wait_for_answer(t.id, Duration::from_millis(100)), None);
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2), "wait overran: {elapsed:?}");
    assert_eq!(b.status(t.id), Some(Status::TimedOut));
    assert_eq!(b.pending_count(), 0);
}

#[test]
fn concurrent_deliveries_only_one_wins() {
    let b = broker();
    let t = b.create_transmission("order", "x.y", Value::Null);

    let racers: Vec<_> = (0..8)
        .map(|i| {
            let b = b.clone();
            thread::spawn(move || b.deliver_answer(t.id, json!(i)))
        })
        .collect();
    let wins = racers
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);

    let answer = b.wait_for_answer(t.id, Duration::from_millis(50)).unwrap();
    assert!(answer.content.is_u64());
    // Nothing left to deliver to.
    assert!(!b.deliver_answer(t.id, json!("again")));
}

#[test]
fn many_waiters_each_get_their_own_answer() {
    let b = broker();
    let ids: Vec<u64> = (0..16)
        .map(|_| b.create_transmission("order", "x.y", Value::Null).id)
        .collect();

    let waiters: Vec<_> = ids
        .iter()
        .map(|&id| {
            let b = b.clone();
            thread::spawn(move || b.wait_for_answer(id, Duration::from_secs(5)))
        })
        .collect();

    // Answer in reverse creation order.
    for &id in ids.iter().rev() {
        assert!(b.deliver_answer(id, json!(id)));
    }

    for (id, waiter) in ids.iter().zip(waiters) {
        let answer = waiter.join().unwrap().unwrap();
        assert_eq!(answer.id, *id);
        assert_eq!(answer.content, json!(id));
    }
    assert_eq!(b.pending_count(), 0);
}

#[test]
fn unroutable_command_stays_pending_until_timeout() {
    let b = broker();
    let t = b.create_transmission("order", "aptitudes.ghost.walk", json!({}));
    assert_eq!(b.status(t.id), Some(Status::Pending));
    assert_eq!(b.wait_for_answer(t.id, Duration::from_millis(30)), None);
    assert_eq!(b.status(t.id), Some(Status::TimedOut));
}

#[test]
fn acknowledged_answer_is_never_lost_at_timeout() {
    let b = broker();
    for round in 0..200u64 {
        let t = b.create_transmission("order", "x.y", Value::Null);
        let deliverer = {
            let b = b.clone();
            thread::spawn(move || {
                // Land around the waiter's deadline.
                thread::sleep(Duration::from_micros(900 + (round % 5) * 50));
                b.deliver_answer(t.id, json!(round))
            })
        };
        let got = b.wait_for_answer(t.id, Duration::from_millis(1));
        let acknowledged = deliverer.join().unwrap();
        assert_eq!(
            acknowledged,
            got.is_some(),
            "round {round}: delivery acknowledged={acknowledged} but waiter got {got:?}"
        );
        if let Some(answer) = got {
            assert_eq!(answer.content, json!(round));
        }
    }
    assert_eq!(b.pending_count(), 0);
}
