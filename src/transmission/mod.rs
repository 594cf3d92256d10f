//! Transmission protocol: correlated command/answer messages between
//! aptitudes.
//!
//! ```text
//!  caller ──create_transmission──▶ Broker ──Envelope::Transmission──▶ Link ──▶ aptitude
//!    ▲                               │                                          │
//!    └──────wait_for_answer──────────┘◀──deliver_answer◀── Envelope::Answer ◀────┘
//! ```
//!
//! [`Envelope`] is the wire contract.  It crosses thread boundaries as a
//! value and process boundaries as a length-prefixed JSON frame
//! (see [`codec`]).

pub mod broker;
pub mod codec;
pub mod link;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use broker::TransmissionBroker;
pub use link::{Link, Transport};

/// Correlation identifier, unique for the broker's lifetime.
pub type TransmissionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Answered,
    TimedOut,
}

/// A named command with a structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub id: TransmissionId,
    pub category: String,
    pub command: String,
    pub content: Value,
    pub status: Status,
}

/// The single reply correlated to a [`Transmission`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: TransmissionId,
    pub content: Value,
}

/// Everything that travels over a [`Link`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    Transmission(Transmission),
    Answer(Answer),
    /// Stop the receiving run loop.
    Shutdown,
}

/// `aptitudes.<name>.<action>` or `<name>.<action>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPath<'a> {
    pub aptitude: &'a str,
    pub action: &'a str,
}

impl<'a> CommandPath<'a> {
    pub fn parse(command: &'a str) -> Option<Self> {
        let rest = command.strip_prefix("aptitudes.").unwrap_or(command);
        let (aptitude, action) = rest.split_once('.')?;
        if aptitude.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self { aptitude, action })
    }
}
