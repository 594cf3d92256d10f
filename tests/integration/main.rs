//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one subsystem against
//! the simulation board.  Everything runs on the host; no hardware is
//! required.

mod aptitude_tests;
mod broker_tests;
mod harness;
mod wings_tests;
