//! Transmission broker: correlation id → pending answer.
//!
//! Each Pending entry owns a one-shot [`Signal`].  `deliver_answer`
//! resolves it exactly once; `wait_for_answer` awaits it against a
//! reactor timer, so a wait never outlives its timeout.
//!
//! Entries leave the map when their waiter collects the answer, when the
//! wait times out, or when a fire-and-forget caller abandons them.  The
//! last [`STATUS_HISTORY`] retired statuses stay queryable through
//! [`TransmissionBroker::status`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::HistoryBuffer;
use log::{debug, info, warn};
use serde_json::Value;

use super::link::Transport;
use super::{Answer, CommandPath, Envelope, Status, Transmission, TransmissionId};
use crate::config::TransmissionConfig;
use crate::timer;

/// Retired statuses kept for diagnostics.
pub const STATUS_HISTORY: usize = 64;

struct Pending {
    status: Status,
    answer: Arc<Signal<CriticalSectionRawMutex, Answer>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TransmissionBroker {
    next_id: AtomicU64,
    /// Lock order: `pending` before `history`.
    pending: Mutex<HashMap<TransmissionId, Pending>>,
    history: Mutex<HistoryBuffer<(TransmissionId, Status), STATUS_HISTORY>>,
    routes: Mutex<HashMap<String, Arc<dyn Transport>>>,
    default_timeout: Duration,
}

impl TransmissionBroker {
    pub fn new(config: &TransmissionConfig) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            history: Mutex::new(HistoryBuffer::new()),
            routes: Mutex::new(HashMap::new()),
            default_timeout: config.answer_timeout(),
        }
    }

    fn alloc_id(&self) -> TransmissionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Answer timeout used by `order(.., block = true)`.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Route commands addressed to `name` into `link`.
    pub fn register_route(&self, name: &str, link: Arc<dyn Transport>) {
        if lock(&self.routes).insert(name.to_owned(), link).is_some() {
            warn!("BROKER: route '{}' replaced", name);
        } else {
            info!("BROKER: route '{}' registered", name);
        }
    }

    pub fn unregister_route(&self, name: &str) -> bool {
        lock(&self.routes).remove(name).is_some()
    }

    /// Registered aptitude names, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.routes).keys().cloned().collect();
        names.sort();
        names
    }

    fn route(&self, transmission: &Transmission) {
        let Some(path) = CommandPath::parse(&transmission.command) else {
            warn!(
                "BROKER[{}]: malformed command '{}', not routed",
                transmission.id, transmission.command
            );
            return;
        };
        let link = lock(&self.routes).get(path.aptitude).cloned();
        let Some(link) = link else {
            warn!(
                "BROKER[{}]: no aptitude '{}' registered",
                transmission.id, path.aptitude
            );
            return;
        };
        if let Err(e) = link.send(&Envelope::Transmission(transmission.clone())) {
            warn!(
                "BROKER[{}]: send to '{}' failed: {}",
                transmission.id, path.aptitude, e
            );
        }
    }

    // -----------------------------------------------------------------------
    // Correlation
    // -----------------------------------------------------------------------

    /// Register a Pending transmission under a fresh id and route it.
    pub fn create_transmission(
        &self,
        category: &str,
        command: &str,
        content: Value,
    ) -> Transmission {
        let transmission = Transmission {
            id: self.alloc_id(),
            category: category.to_owned(),
            command: command.to_owned(),
            content,
            status: Status::Pending,
        };
        lock(&self.pending).insert(
            transmission.id,
            Pending {
                status: Status::Pending,
                answer: Arc::new(Signal::new()),
            },
        );
        debug!(
            "BROKER[{}]: created {} '{}'",
            transmission.id, category, command
        );
        self.route(&transmission);
        transmission
    }

    /// Block until the answer for `id` arrives, at most `timeout`.
    ///
    /// `None` on timeout or for an id that is not pending.
    pub fn wait_for_answer(&self, id: TransmissionId, timeout: Duration) -> Option<Answer> {
        let signal = match lock(&self.pending).get(&id) {
            Some(p) => p.answer.clone(),
            None => {
                debug!("BROKER[{}]: wait on unknown id", id);
                return None;
            }
        };

        if let Some(answer) = timer::block_on_timeout(signal.wait(), timeout) {
            self.retire(id, Status::Answered);
            return Some(answer);
        }

        // Deliveries signal under the `pending` lock, so checking and
        // retiring under it cannot lose an acknowledged answer.
        let mut pending = lock(&self.pending);
        if let Some(answer) = signal.try_take() {
            Self::retire_locked(&mut pending, &self.history, id, Status::Answered);
            return Some(answer);
        }
        Self::retire_locked(&mut pending, &self.history, id, Status::TimedOut);
        drop(pending);
        debug!("BROKER[{}]: timed out after {:?}", id, timeout);
        None
    }

    /// Attach the answer for `id` and wake its waiter.
    ///
    /// Unknown and already-answered ids are ignored; returns whether the
    /// answer was taken.
    pub fn deliver_answer(&self, id: TransmissionId, content: Value) -> bool {
        let mut pending = lock(&self.pending);
        match pending.get_mut(&id) {
            Some(p) if p.status == Status::Pending => {
                p.status = Status::Answered;
                p.answer.signal(Answer { id, content });
                true
            }
            Some(_) => {
                debug!("BROKER[{}]: duplicate answer ignored", id);
                false
            }
            None => {
                debug!("BROKER[{}]: answer for unknown id ignored", id);
                false
            }
        }
    }

    /// Forget a Pending entry nobody will wait on.
    pub fn abandon(&self, id: TransmissionId) {
        lock(&self.pending).remove(&id);
    }

    fn retire(&self, id: TransmissionId, status: Status) {
        let mut pending = lock(&self.pending);
        Self::retire_locked(&mut pending, &self.history, id, status);
    }

    fn retire_locked(
        pending: &mut HashMap<TransmissionId, Pending>,
        history: &Mutex<HistoryBuffer<(TransmissionId, Status), STATUS_HISTORY>>,
        id: TransmissionId,
        status: Status,
    ) {
        pending.remove(&id);
        lock(history).write((id, status));
    }

    /// Current or recently retired status of `id`.
    pub fn status(&self, id: TransmissionId) -> Option<Status> {
        if let Some(p) = lock(&self.pending).get(&id) {
            return Some(p.status);
        }
        lock(&self.history)
            .oldest_ordered()
            .find(|(i, _)| *i == id)
            .map(|(_, s)| *s)
    }

    /// Entries still in the map (pending or answered but not collected).
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}
