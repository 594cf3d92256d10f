//! Adapters: concrete implementations of the core's small port traits.
//!
//! | Adapter    | Implements  | Connects to            |
//! |------------|-------------|------------------------|
//! | `log_sink` | EventSink   | `log` facade (stderr)  |
//! | `time`     | Clock       | `std::time::Instant`   |

pub mod log_sink;
pub mod time;
