//! `wings` aptitude: the wing actuator over the command protocol.
//!
//! | Action             | Arguments            | Result                    |
//! |--------------------|----------------------|---------------------------|
//! | `get_position`     |                      | `"up"` / `"down"` / …     |
//! | `state`            |                      | as above, or `"moving"`   |
//! | `is_moving`        |                      | bool                      |
//! | `move_to_position` | `{position}`         | accepted target           |
//! | `move_count`       | `{count}`            | accepted count            |
//! | `move_time`        | `{seconds}`          | accepted seconds          |
//! | `push_wing`        | `{side}`             | side                      |
//! | `recalibrate`      |                      | calibrated position       |
//! | `wait_idle`        | `{seconds}`          | whether the queue drained |
//! | `events`           |                      | pending switch events     |
//! | `last_error`       |                      | error string or null      |

use serde_json::{Value, json};

use super::{Aptitude, Orders, arg_seconds, arg_str, arg_u32};
use crate::error::{Error, LinkError, Result};
use crate::events::Event;
use crate::wings::{Side, WingActuator, WingState};

pub struct WingsAptitude {
    actuator: WingActuator,
}

impl WingsAptitude {
    pub fn new(actuator: WingActuator) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &WingActuator {
        &self.actuator
    }
}

impl Aptitude for WingsAptitude {
    fn name(&self) -> &str {
        "wings"
    }

    fn handle(
        &mut self,
        action: &str,
        arguments: &Value,
        _orders: &mut Orders<'_>,
    ) -> Result<Value> {
        let wings = &self.actuator;
        match action {
            "get_position" => Ok(json!(wings.get_position())),
            "state" => Ok(json!(wings.state())),
            "is_moving" => Ok(json!(wings.is_moving())),
            "move_to_position" => {
                let target: WingState = arg_str(arguments, "position")?.parse()?;
                wings.move_to_position(target)?;
                Ok(json!(target))
            }
            "move_count" => {
                let count = arg_u32(arguments, "count")?;
                wings.move_count(count)?;
                Ok(json!(count))
            }
            "move_time" => {
                let duration = arg_seconds(arguments, "seconds")?;
                wings.move_time(duration)?;
                Ok(json!(duration.as_secs_f64()))
            }
            "push_wing" => {
                let side: Side = arg_str(arguments, "side")?.parse()?;
                wings.push_wing(side)?;
                Ok(json!(side))
            }
            "recalibrate" => Ok(json!(wings.recalibrate()?)),
            "wait_idle" => Ok(json!(wings.wait_idle(arg_seconds(arguments, "seconds")?))),
            "events" => {
                let mut drained: Vec<Event> = Vec::new();
                wings.events().drain(|e| drained.push(e));
                serde_json::to_value(&drained).map_err(|e| LinkError::Codec(e.to_string()).into())
            }
            "last_error" => Ok(json!(wings.take_error().map(|e| e.to_string()))),
            other => Err(Error::UnknownCommand(format!("wings.{other}"))),
        }
    }
}
