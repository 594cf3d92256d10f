//! TuxEatPi core library.
//!
//! Wing actuator control (calibration, movement state machine, switch
//! events) and the transmission protocol that lets aptitudes order each
//! other around, in-process or across OS processes.
//!
//! Hardware is reached only through [`drivers::gpio::PinInterface`];
//! [`drivers::sim::SimBoard`] stands in for it on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod aptitudes;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod pins;
pub mod timer;
pub mod transmission;
pub mod wings;

pub use error::{Error, Result};
