//! Worker-side ordering: an aptitude commanding its siblings.
//!
//! ```text
//!   worker run loop ──Transmission{id: worker id}──▶ host pump
//!                                                      │ relay thread
//!                                                      ▼
//!                                   broker ──▶ sibling aptitude
//!   worker run loop ◀──Answer{id: worker id}──── relay thread
//! ```
//!
//! While an order blocks, inbound transmissions for the worker itself
//! are parked in a backlog and served once the handler returns.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde_json::{Value, json};

use super::OrderRequest;
use crate::transmission::{Envelope, Link, Status, Transmission, TransmissionId, Transport};

/// Ordering handle passed to [`Aptitude::handle`](super::Aptitude::handle)
/// and [`Aptitude::idle`](super::Aptitude::idle).
pub struct Orders<'a> {
    link: &'a Link,
    answer_timeout: Duration,
    next_id: TransmissionId,
    backlog: VecDeque<Envelope>,
}

impl<'a> Orders<'a> {
    pub fn new(link: &'a Link, answer_timeout: Duration) -> Self {
        Self {
            link,
            answer_timeout,
            next_id: 1,
            backlog: VecDeque::new(),
        }
    }

    /// Send `command` to whichever aptitude it addresses.
    ///
    /// With `block`, waits up to the answer timeout and returns the answer
    /// content; otherwise returns `None` at once.
    pub fn order(&mut self, command: &str, arguments: Value, block: bool) -> Option<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let transmission = Transmission {
            id,
            category: "order".into(),
            command: command.to_owned(),
            content: json!({ "arguments": arguments }),
            status: Status::Pending,
        };
        if let Err(e) = self.link.send(&Envelope::Transmission(transmission)) {
            warn!("ORDERS[{}]: '{}' not sent: {}", self.link.label(), command, e);
            return None;
        }
        if !block {
            return None;
        }

        let deadline = Instant::now() + self.answer_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.link.recv_timeout(deadline - now) {
                Some(Envelope::Answer(answer)) if answer.id == id => return Some(answer.content),
                Some(Envelope::Answer(answer)) => {
                    debug!(
                        "ORDERS[{}]: late answer {} dropped",
                        self.link.label(),
                        answer.id
                    );
                }
                Some(Envelope::Shutdown) => {
                    self.backlog.push_back(Envelope::Shutdown);
                    return None;
                }
                Some(other) => self.backlog.push_back(other),
                None => break,
            }
        }
        warn!(
            "ORDERS[{}]: no answer to '{}' within {:?}",
            self.link.label(),
            command,
            self.answer_timeout
        );
        None
    }

    pub fn order_request(&mut self, request: OrderRequest) -> Option<Value> {
        self.order(&request.command, request.arguments, request.block)
    }

    /// Next envelope for the run loop: parked ones first.
    pub(crate) fn next_inbound(&mut self, poll: Duration) -> Option<Envelope> {
        self.backlog
            .pop_front()
            .or_else(|| self.link.recv_timeout(poll))
    }
}
