//! Pin abstraction, wing motor driver, simulation board and thread helpers.

pub mod gpio;
pub mod motor;
pub mod sim;
pub mod task;
