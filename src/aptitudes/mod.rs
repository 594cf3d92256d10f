//! Aptitudes: named command handlers driven by a message run loop.
//!
//! An aptitude receives [`Envelope::Transmission`]s over a [`Link`],
//! executes the addressed action and replies with an
//! [`Envelope::Answer`] whose content is `{"result": …}` or
//! `{"error": "…"}`.  [`subprocess::SubprocessedAptitude`] hosts the loop on
//! a thread or in a child process.  Handlers order their siblings through
//! the [`Orders`] handle they are given.

pub mod being;
pub mod orders;
pub mod subprocess;
pub mod wings;

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::TransmissionConfig;
use crate::error::{Error, LinkError, Result};
use crate::transmission::{Answer, CommandPath, Envelope, Link, Transmission, Transport};

pub use orders::Orders;
pub use subprocess::SubprocessedAptitude;

/// A logical robot function reachable by command.
pub trait Aptitude: Send {
    /// Routing name (`aptitudes.<name>.<action>`).
    fn name(&self) -> &str;

    /// Execute one action.  `orders` reaches the other aptitudes.
    fn handle(
        &mut self,
        action: &str,
        arguments: &Value,
        orders: &mut Orders<'_>,
    ) -> Result<Value>;

    /// Called when no message arrived within the poll interval.
    fn idle(&mut self, _orders: &mut Orders<'_>) {}
}

/// External order shape: `{command, arguments = {}, block = true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub command: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
    #[serde(default = "block_by_default")]
    pub block: bool,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

fn block_by_default() -> bool {
    true
}

/// Serve `aptitude` on `link` until `Shutdown` or the link closes.
pub fn run(aptitude: &mut dyn Aptitude, link: &Link, config: &TransmissionConfig) {
    info!("APTITUDE[{}]: running", aptitude.name());
    let poll = config.poll_interval();
    let mut orders = Orders::new(link, config.answer_timeout());
    loop {
        match orders.next_inbound(poll) {
            None => aptitude.idle(&mut orders),
            Some(Envelope::Shutdown) => break,
            Some(Envelope::Answer(answer)) => {
                debug!(
                    "APTITUDE[{}]: stray answer {} ignored",
                    aptitude.name(),
                    answer.id
                );
            }
            Some(Envelope::Transmission(transmission)) => {
                let reply = Envelope::Answer(Answer {
                    id: transmission.id,
                    content: dispatch(aptitude, &transmission, &mut orders),
                });
                match link.send(&reply) {
                    Ok(()) => {}
                    Err(LinkError::Closed) => break,
                    Err(e) => warn!("APTITUDE[{}]: reply failed: {}", aptitude.name(), e),
                }
            }
        }
    }
    info!("APTITUDE[{}]: stopped", aptitude.name());
}

/// Execute one transmission and build the answer content.
pub fn dispatch(
    aptitude: &mut dyn Aptitude,
    transmission: &Transmission,
    orders: &mut Orders<'_>,
) -> Value {
    let outcome = match CommandPath::parse(&transmission.command) {
        Some(path) if path.aptitude == aptitude.name() => {
            let arguments = transmission
                .content
                .get("arguments")
                .cloned()
                .unwrap_or_else(empty_arguments);
            debug!(
                "APTITUDE[{}]: {} (id {})",
                aptitude.name(),
                path.action,
                transmission.id
            );
            aptitude.handle(path.action, &arguments, orders)
        }
        _ => Err(Error::UnknownCommand(transmission.command.clone())),
    };
    match outcome {
        Ok(result) => json!({ "result": result }),
        Err(e) => {
            warn!("APTITUDE[{}]: {}", aptitude.name(), e);
            json!({ "error": e.to_string() })
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

pub(crate) fn arg_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadArguments(format!("'{key}' must be a string")))
}

pub(crate) fn arg_u32(arguments: &Value, key: &str) -> Result<u32> {
    arguments
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| Error::BadArguments(format!("'{key}' must be a non-negative integer")))
}

pub(crate) fn arg_seconds(arguments: &Value, key: &str) -> Result<Duration> {
    arguments
        .get(key)
        .and_then(Value::as_f64)
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .ok_or_else(|| Error::BadArguments(format!("'{key}' must be a non-negative number")))
}
