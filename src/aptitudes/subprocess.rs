//! Hosting an aptitude outside the caller's thread of control.
//!
//! ```text
//!   SubprocessedAptitude
//!     ├─ worker : aptitude run loop (thread, or child process over stdio)
//!     ├─ link   : host end of the envelope channel (broker route)
//!     └─ pump   : host thread feeding inbound Answers to the broker and
//!                 relaying the worker's own orders through it
//! ```

use std::io;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde_json::{Value, json};

use super::{Aptitude, OrderRequest, run};
use crate::config::TransmissionConfig;
use crate::drivers::task;
use crate::error::{Error, LinkError, Result};
use crate::transmission::{Answer, Envelope, Link, Transmission, TransmissionBroker, Transport};

/// Grace period for a child process to exit after `Shutdown`.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

enum Worker {
    Thread(JoinHandle<()>),
    Process(Child),
}

/// An aptitude running on its own thread or in its own OS process,
/// reachable through the broker.
pub struct SubprocessedAptitude {
    name: String,
    broker: Arc<TransmissionBroker>,
    link: Arc<Link>,
    worker: Option<Worker>,
    pump: Option<JoinHandle<()>>,
}

fn spawn_error(e: &io::Error) -> Error {
    Error::Thread(e.kind())
}

impl SubprocessedAptitude {
    /// Run `aptitude` on a dedicated thread, linked in-process.
    pub fn spawn(
        aptitude: Box<dyn Aptitude>,
        broker: Arc<TransmissionBroker>,
        config: &TransmissionConfig,
    ) -> Result<Self> {
        let name = aptitude.name().to_owned();
        let (host, remote) = Link::pair();
        let config = config.clone();
        let mut aptitude = aptitude;
        let handle = task::spawn_named(&format!("apt-{name}"), task::DEFAULT_STACK_KB, move || {
            run(aptitude.as_mut(), &remote, &config);
        })
        .map_err(|e| spawn_error(&e))?;
        Self::attach(name, host, Worker::Thread(handle), broker)
    }

    /// Run an aptitude in a child process speaking framed envelopes on
    /// its stdin/stdout (see [`serve_stdio`]).
    pub fn spawn_process(
        name: &str,
        mut command: Command,
        broker: Arc<TransmissionBroker>,
    ) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(LinkError::from)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(LinkError::Closed.into());
        };
        info!("APTITUDE[{}]: child pid {}", name, child.id());
        let link = Link::over_stream(name, stdout, stdin)?;
        Self::attach(name.to_owned(), link, Worker::Process(child), broker)
    }

    fn attach(
        name: String,
        link: Link,
        worker: Worker,
        broker: Arc<TransmissionBroker>,
    ) -> Result<Self> {
        let link = Arc::new(link);
        broker.register_route(&name, link.clone());

        let pump_link = link.clone();
        let pump_broker = broker.clone();
        let pump_name = name.clone();
        let pump = task::spawn_named(&format!("pump-{name}"), 32, move || {
            pump_answers(&pump_name, &pump_link, &pump_broker);
        })
        .map_err(|e| spawn_error(&e))?;

        Ok(Self {
            name,
            broker,
            link,
            worker: Some(worker),
            pump: Some(pump),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Issue `command` with `arguments` through the broker.
    ///
    /// With `block`, waits up to the broker's answer timeout and returns
    /// the answer content; otherwise returns `None` immediately.
    pub fn order(&self, command: &str, arguments: Value, block: bool) -> Option<Value> {
        let transmission =
            self.broker
                .create_transmission("order", command, json!({ "arguments": arguments }));
        if !block {
            self.broker.abandon(transmission.id);
            return None;
        }
        let timeout = self.broker.default_timeout();
        if let Some(answer) = self.broker.wait_for_answer(transmission.id, timeout) {
            return Some(answer.content);
        }
        warn!(
            "APTITUDE[{}]: no answer to '{}' (id {}) within {:?}",
            self.name, command, transmission.id, timeout
        );
        None
    }

    pub fn order_request(&self, request: OrderRequest) -> Option<Value> {
        self.order(&request.command, request.arguments, request.block)
    }

    /// Stop the worker and the pump.  Idempotent.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.broker.unregister_route(&self.name);
        if let Err(e) = self.link.send(&Envelope::Shutdown) {
            debug!("APTITUDE[{}]: shutdown not delivered: {}", self.name, e);
        }

        match worker {
            Worker::Thread(handle) => {
                if handle.join().is_err() {
                    warn!("APTITUDE[{}]: worker panicked", self.name);
                }
            }
            Worker::Process(mut child) => reap(&self.name, &mut child),
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
        info!("APTITUDE[{}]: shut down", self.name);
    }
}

impl Drop for SubprocessedAptitude {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reap(name: &str, child: &mut Child) {
    let deadline = Instant::now() + CHILD_EXIT_GRACE;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("APTITUDE[{}]: child exited with {}", name, status);
                return;
            }
            Ok(None) if Instant::now() < deadline => crate::timer::sleep(Duration::from_millis(20)),
            Ok(None) | Err(_) => {
                warn!("APTITUDE[{}]: child did not exit, killing", name);
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
        }
    }
}

/// Host side: deliver inbound answers to the broker and relay the
/// worker's own orders until the link shuts down.
fn pump_answers(name: &str, link: &Arc<Link>, broker: &Arc<TransmissionBroker>) {
    loop {
        match link.recv() {
            Envelope::Answer(answer) => {
                if !broker.deliver_answer(answer.id, answer.content) {
                    debug!("APTITUDE[{}]: answer {} had no waiter", name, answer.id);
                }
            }
            Envelope::Transmission(order) => relay(name, link, broker, order),
            Envelope::Shutdown => break,
        }
    }
    debug!("APTITUDE[{}]: pump stopped", name);
}

/// Re-issue a worker's order through the broker and send the answer back
/// under the worker's own id.  Waits on a separate thread so the pump
/// keeps delivering answers meanwhile.
fn relay(name: &str, link: &Arc<Link>, broker: &Arc<TransmissionBroker>, order: Transmission) {
    let worker_id = order.id;
    let relayed = broker.create_transmission(&order.category, &order.command, order.content);
    debug!(
        "APTITUDE[{}]: relaying '{}' (worker id {} -> {})",
        name, relayed.command, worker_id, relayed.id
    );

    let relayed_id = relayed.id;
    let link = link.clone();
    let waiter = broker.clone();
    let label = name.to_owned();
    let spawned = task::spawn_named(&format!("relay-{name}"), 32, move || {
        let Some(answer) = waiter.wait_for_answer(relayed.id, waiter.default_timeout()) else {
            debug!(
                "APTITUDE[{}]: relayed '{}' went unanswered",
                label, relayed.command
            );
            return;
        };
        let reply = Envelope::Answer(Answer {
            id: worker_id,
            content: answer.content,
        });
        if let Err(e) = link.send(&reply) {
            debug!("APTITUDE[{}]: relayed answer not delivered: {}", label, e);
        }
    });
    if let Err(e) = spawned {
        warn!("APTITUDE[{}]: relay thread spawn failed: {}", name, e);
        broker.abandon(relayed_id);
    }
}

/// Child-process entry point: serve `aptitude` on stdin/stdout.
///
/// Returns once the parent sends `Shutdown` or closes stdin.
pub fn serve_stdio(aptitude: &mut dyn Aptitude, config: &TransmissionConfig) -> Result<()> {
    let link = Link::over_stream("stdio", io::stdin(), io::stdout())?;
    run(aptitude, &link, config);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aptitudes::Orders;
    use crate::error::Result;

    struct Counter(u32);

    impl Aptitude for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn handle(
            &mut self,
            action: &str,
            _arguments: &Value,
            _orders: &mut Orders<'_>,
        ) -> Result<Value> {
            match action {
                "next" => {
                    self.0 += 1;
                    Ok(json!(self.0))
                }
                other => Err(Error::UnknownCommand(other.into())),
            }
        }
    }

    /// Asks the counter on behalf of whoever orders it.
    struct Proxy;

    impl Aptitude for Proxy {
        fn name(&self) -> &str {
            "proxy"
        }

        fn handle(
            &mut self,
            action: &str,
            _arguments: &Value,
            orders: &mut Orders<'_>,
        ) -> Result<Value> {
            match action {
                "count" => Ok(json!(orders.order("counter.next", json!({}), true))),
                other => Err(Error::UnknownCommand(other.into())),
            }
        }
    }

    fn config() -> TransmissionConfig {
        TransmissionConfig {
            answer_timeout_ms: 2_000,
            poll_interval_ms: 10,
        }
    }

    #[test]
    fn threaded_order_round_trip() {
        let broker = Arc::new(TransmissionBroker::new(&config()));
        let apt = SubprocessedAptitude::spawn(Box::new(Counter(0)), broker.clone(), &config())
            .unwrap();
        assert_eq!(
            apt.order("counter.next", json!({}), true),
            Some(json!({"result": 1}))
        );
        assert_eq!(
            apt.order("aptitudes.counter.next", json!({}), true),
            Some(json!({"result": 2}))
        );
        assert_eq!(broker.routes(), vec!["counter".to_owned()]);
    }

    #[test]
    fn non_blocking_order_returns_none() {
        let broker = Arc::new(TransmissionBroker::new(&config()));
        let apt = SubprocessedAptitude::spawn(Box::new(Counter(0)), broker.clone(), &config())
            .unwrap();
        assert_eq!(apt.order("counter.next", json!({}), false), None);
        assert_eq!(broker.pending_count(), 0);
        // Still served: the next blocking order sees the side effect.
        assert_eq!(
            apt.order("counter.next", json!({}), true),
            Some(json!({"result": 2}))
        );
    }

    #[test]
    fn shutdown_unregisters_route() {
        let broker = Arc::new(TransmissionBroker::new(&config()));
        let mut apt =
            SubprocessedAptitude::spawn(Box::new(Counter(0)), broker.clone(), &config()).unwrap();
        apt.shutdown();
        apt.shutdown();
        assert!(broker.routes().is_empty());
    }

    #[test]
    fn worker_orders_a_sibling() {
        let broker = Arc::new(TransmissionBroker::new(&config()));
        let counter = SubprocessedAptitude::spawn(Box::new(Counter(0)), broker.clone(), &config())
            .unwrap();
        let proxy =
            SubprocessedAptitude::spawn(Box::new(Proxy), broker.clone(), &config()).unwrap();

        assert_eq!(
            proxy.order("proxy.count", json!({}), true),
            Some(json!({"result": {"result": 1}}))
        );
        assert_eq!(
            counter.order("counter.next", json!({}), true),
            Some(json!({"result": 2}))
        );
    }
}
