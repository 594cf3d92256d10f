//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every switch event to the `log`
//! facade (stderr under `env_logger`).  The demo binary drains the
//! actuator's channel into it.

use log::info;

use crate::events::{Event, EventSink};

/// Adapter that logs every [`Event`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u64,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &Event) {
        self.emitted += 1;
        info!(
            "EVENT | {} | pin={} {} | t={}us",
            event.component, event.pin_id, event.name, event.timestamp_us
        );
    }
}
