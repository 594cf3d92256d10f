//! Interrupt-driven switch event channel.
//!
//! Events are produced by:
//! - GPIO interrupt callbacks (limit switch closures)
//! - The simulation hook (`WingActuator::push_wing`)
//!
//! Events are consumed by tests, diagnostics and the `wings` aptitude,
//! which dequeue them one at a time (blocking with a timeout) or drain
//! everything pending.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO IRQ    │────▶│              │     │  Test / diag │
//! │ Sim hook    │────▶│ EventChannel │────▶│  Aptitude    │
//! │             │     │ (MPMC, FIFO) │     │  (consumers) │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use serde::Serialize;

use crate::timer;

/// Maximum length of a component name stamped on events.
pub const COMPONENT_NAME_CAP: usize = 32;

/// Longest a blocked consumer sleeps before re-checking the queue.
const WAKE_SLICE: Duration = Duration::from_millis(10);

/// Fixed-capacity component name.
pub type ComponentName = heapless::String<COMPONENT_NAME_CAP>;

/// A single observed switch transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Originating component (e.g. the actuator's configured name).
    pub component: ComponentName,
    /// Physical pin that fired.
    pub pin_id: i32,
    /// Logical pin name (`left_switch` / `right_switch`).
    pub name: &'static str,
    /// Microseconds since the producer's clock started.
    pub timestamp_us: u64,
}

/// Consumer of switch events (logging, diagnostics, forwarding).
pub trait EventSink {
    fn emit(&mut self, event: &Event);
}

/// Unbounded multi-producer / multi-consumer FIFO of [`Event`]s.
///
/// Producers never remove entries; consumers remove by dequeuing.
/// Nothing is dropped: the queue grows until someone drains it.
pub struct EventChannel {
    queue: Mutex<VecDeque<Event>>,
    /// Raised on every push; wakes one blocked consumer.
    arrived: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrived: Signal::new(),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event.
    pub fn push(&self, event: Event) {
        self.queue().push_back(event);
        self.arrived.signal(());
    }

    /// Pop the next event, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<Event> {
        self.queue().pop_front()
    }

    /// Pop the next event, waiting at most `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(event) = self.try_pop() {
                return Some(event);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // Another consumer may take the wake-up; re-check in slices.
            let slice = (deadline - now).min(WAKE_SLICE);
            let _ = timer::block_on_timeout(self.arrived.wait(), slice);
        }
    }

    /// Drain all pending events into a callback, in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.try_pop() {
            handler(event);
        }
    }

    /// Drain all pending events into `sink`.  Returns how many were sent.
    pub fn drain_into(&self, sink: &mut impl EventSink) -> usize {
        let mut n = 0;
        self.drain(|event| {
            sink.emit(&event);
            n += 1;
        });
        n
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue().len()
    }
}
