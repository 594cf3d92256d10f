//! `being` aptitude: the robot's identity.
//!
//! Answers with structured values; rendering them as sentences is left
//! to the caller.

use serde_json::{Value, json};

use super::{Aptitude, Orders};
use crate::adapters::time::{Clock, UptimeParts};
use crate::config::SystemConfig;
use crate::error::{Error, LinkError, Result};

pub struct BeingAptitude {
    name: String,
    birthday: String,
    clock: Clock,
}

impl BeingAptitude {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            name: config.name.clone(),
            birthday: config.birthday.clone(),
            clock: Clock::new(),
        }
    }
}

impl Aptitude for BeingAptitude {
    fn name(&self) -> &str {
        "being"
    }

    fn handle(
        &mut self,
        action: &str,
        _arguments: &Value,
        _orders: &mut Orders<'_>,
    ) -> Result<Value> {
        match action {
            "get_name" => Ok(json!(self.name)),
            "get_birthday" => Ok(json!(self.birthday)),
            "get_uptime" => serde_json::to_value(UptimeParts::from_secs(self.clock.uptime_secs()))
                .map_err(|e| LinkError::Codec(e.to_string()).into()),
            other => Err(Error::UnknownCommand(format!("being.{other}"))),
        }
    }
}
