//! Named worker thread spawning.
//!
//! Every long-lived thread in the core (actuator control loop, board
//! interrupt dispatcher, aptitude run loops, link readers) is created
//! through [`spawn_named`] so that thread names and stack sizes are
//! uniform and show up in logs and panics.

use std::io;
use std::thread::{self, JoinHandle};

/// Default worker stack size in KiB.
pub const DEFAULT_STACK_KB: usize = 64;

/// Spawn a named thread with an explicit stack size.
pub fn spawn_named<F, T>(name: &str, stack_kb: usize, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!("Spawning '{}' (stack={}KB)", name, stack_kb);
    thread::Builder::new()
        .name(name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
