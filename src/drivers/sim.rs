//! In-memory simulation board.
//!
//! Implements [`PinInterface`] without hardware: pin levels live in a
//! map, interrupt edges are queued on a bounded channel and dispatched
//! to registered callbacks by a dedicated `sim-irq` thread (FIFO, one
//! callback at a time, like a GPIO ISR service).
//!
//! An optional wing rig models the mechanism:
//!
//! ```text
//!   movement HIGH ──▶ wing leaves its end-stop (switch opens, rising edge)
//!                     … travel time …
//!                 ──▶ wing reaches the end-stop selected by `position`
//!                     (switch closes, falling edge) and stalls there
//!   movement LOW  ──▶ travel cancelled, wing stays where it is
//! ```
//!
//! Used by tests, the demo binary and aptitude worker processes.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_hal::digital::PinState;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::gpio::{Edge, EdgeCallback, PinInterface};
use super::motor::Direction;
use super::task;
use crate::config::SimConfig;
use crate::error::PinError;
use crate::pins::PinAssignment;
use crate::timer;

/// Pending interrupt edges before new ones are dropped.
const IRQ_DEPTH: usize = 32;

/// Physical wing position at power-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RigStart {
    Between,
    Up,
    Down,
}

enum Irq {
    Edge { pin: i32, edge: Edge },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    mode: Mode,
    level: PinState,
}

struct WingRig {
    up_switch: i32,
    down_switch: i32,
    motor: i32,
    direction: i32,
    travel: Duration,
    /// End-stop the wing is resting against, if any.
    at: Option<Direction>,
    /// Bumped on every motor/direction write; stale travels check it.
    generation: u64,
}

impl WingRig {
    fn switch_for(&self, end: Direction) -> i32 {
        match end {
            Direction::Up => self.up_switch,
            Direction::Down => self.down_switch,
        }
    }
}

struct Inner {
    lines: Mutex<HashMap<i32, Line>>,
    callbacks: Mutex<HashMap<i32, Vec<(Edge, EdgeCallback)>>>,
    irq: Channel<CriticalSectionRawMutex, Irq, IRQ_DEPTH>,
    rig: Mutex<Option<WingRig>>,
    motor_starts: AtomicU64,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn raise(&self, pin: i32, edge: Edge) {
        if self.irq.try_send(Irq::Edge { pin, edge }).is_err() {
            warn!("sim: IRQ queue full, dropping {:?} on pin {}", edge, pin);
        }
    }

    fn set_level(&self, pin: i32, level: PinState) {
        if let Some(line) = lock(&self.lines).get_mut(&pin) {
            line.level = level;
        }
    }

    fn level(&self, pin: i32) -> PinState {
        lock(&self.lines)
            .get(&pin)
            .map_or(PinState::Low, |l| l.level)
    }
}

/// Simulated GPIO board with an optional wing mechanism.
pub struct SimBoard {
    inner: Arc<Inner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl SimBoard {
    /// Bare board: pins and interrupts only.
    pub fn new() -> io::Result<Self> {
        let inner = Arc::new(Inner {
            lines: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            irq: Channel::new(),
            rig: Mutex::new(None),
            motor_starts: AtomicU64::new(0),
        });
        let worker = inner.clone();
        let dispatcher = task::spawn_named("sim-irq", task::DEFAULT_STACK_KB, move || {
            dispatch_loop(&worker);
        })?;
        Ok(Self {
            inner,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Board with a wing mechanism wired to `pins`.
    pub fn with_wing_rig(pins: &PinAssignment, sim: &SimConfig) -> io::Result<Self> {
        let board = Self::new()?;
        let at = match sim.start {
            RigStart::Between => None,
            RigStart::Up => Some(Direction::Up),
            RigStart::Down => Some(Direction::Down),
        };
        *lock(&board.inner.rig) = Some(WingRig {
            up_switch: pins.left_switch,
            down_switch: pins.right_switch,
            motor: pins.movement,
            direction: pins.position,
            travel: sim.travel(),
            at,
            generation: 0,
        });
        Ok(board)
    }

    /// Number of times the motor line went LOW → HIGH.
    pub fn motor_starts(&self) -> u64 {
        self.inner.motor_starts.load(Ordering::Acquire)
    }

    /// End-stop the simulated wing rests against, if any.
    pub fn rig_position(&self) -> Option<Direction> {
        lock(&self.inner.rig).as_ref().and_then(|r| r.at)
    }

    /// Make the rig ignore the motor from now on (a seized gearbox).
    pub fn jam(&self) {
        if let Some(rig) = lock(&self.inner.rig).as_mut() {
            rig.travel = Duration::MAX;
            rig.generation += 1;
        }
    }

    /// Current level of any configured pin.
    pub fn level(&self, pin: i32) -> Option<PinState> {
        lock(&self.inner.lines).get(&pin).map(|l| l.level)
    }

    /// Re-evaluate the rig after a write to `pin`.
    fn rig_update(&self, pin: i32, rising_motor: bool) {
        let mut rig_guard = lock(&self.inner.rig);
        let Some(rig) = rig_guard.as_mut() else {
            return;
        };
        if pin != rig.motor && pin != rig.direction {
            return;
        }
        rig.generation += 1;

        if rising_motor {
            self.inner.motor_starts.fetch_add(1, Ordering::AcqRel);
        }
        if self.inner.level(rig.motor) == PinState::Low {
            return;
        }

        let dest = if self.inner.level(rig.direction) == PinState::High {
            Direction::Up
        } else {
            Direction::Down
        };
        if rig.at == Some(dest) {
            debug!("sim: wing stalled against {:?} end-stop", dest);
            return;
        }
        if rig.travel == Duration::MAX {
            debug!("sim: wing jammed");
            return;
        }
        if let Some(from) = rig.at.take() {
            let switch = rig.switch_for(from);
            self.inner.set_level(switch, PinState::High);
            self.inner.raise(switch, Edge::Rising);
        }

        let generation = rig.generation;
        let travel = rig.travel;
        let inner = self.inner.clone();
        let spawned = task::spawn_named("sim-travel", 16, move || {
            timer::sleep(travel);
            let mut rig_guard = lock(&inner.rig);
            let Some(rig) = rig_guard.as_mut() else {
                return;
            };
            if rig.generation != generation {
                return;
            }
            rig.at = Some(dest);
            let switch = rig.switch_for(dest);
            inner.set_level(switch, PinState::Low);
            inner.raise(switch, Edge::Falling);
            debug!("sim: wing reached {:?} end-stop", dest);
        });
        if let Err(e) = spawned {
            warn!("sim: travel thread spawn failed: {}", e);
        }
    }

    fn initial_input_level(&self, pin: i32) -> PinState {
        let rig = lock(&self.inner.rig);
        match rig.as_ref() {
            Some(r) if r.at.is_some_and(|end| r.switch_for(end) == pin) => PinState::Low,
            _ => PinState::High,
        }
    }
}

impl PinInterface for SimBoard {
    fn setup_input(&self, pin: i32) -> Result<(), PinError> {
        let level = self.initial_input_level(pin);
        lock(&self.inner.lines).insert(
            pin,
            Line {
                mode: Mode::Input,
                level,
            },
        );
        Ok(())
    }

    fn setup_output(&self, pin: i32) -> Result<(), PinError> {
        lock(&self.inner.lines).insert(
            pin,
            Line {
                mode: Mode::Output,
                level: PinState::Low,
            },
        );
        Ok(())
    }

    fn read(&self, pin: i32) -> Result<PinState, PinError> {
        lock(&self.inner.lines)
            .get(&pin)
            .map(|l| l.level)
            .ok_or(PinError::Unconfigured(pin))
    }

    fn write(&self, pin: i32, state: PinState) -> Result<(), PinError> {
        let previous = {
            let mut lines = lock(&self.inner.lines);
            let line = lines.get_mut(&pin).ok_or(PinError::Unconfigured(pin))?;
            if line.mode != Mode::Output {
                return Err(PinError::WrongMode(pin));
            }
            let previous = line.level;
            line.level = state;
            previous
        };
        if previous != state {
            let rising = previous == PinState::Low && state == PinState::High;
            let is_motor = lock(&self.inner.rig).as_ref().is_some_and(|r| r.motor == pin);
            self.rig_update(pin, rising && is_motor);
        }
        Ok(())
    }

    fn on_edge(&self, pin: i32, edge: Edge, callback: EdgeCallback) -> Result<(), PinError> {
        match lock(&self.inner.lines).get(&pin) {
            Some(line) if line.mode == Mode::Input => {}
            Some(_) => return Err(PinError::WrongMode(pin)),
            None => return Err(PinError::Unconfigured(pin)),
        }
        lock(&self.inner.callbacks)
            .entry(pin)
            .or_default()
            .push((edge, callback));
        Ok(())
    }

    fn inject_edge(&self, pin: i32, edge: Edge) -> Result<(), PinError> {
        match lock(&self.inner.lines).get(&pin) {
            Some(line) if line.mode == Mode::Input => {}
            Some(_) => return Err(PinError::WrongMode(pin)),
            None => return Err(PinError::Unconfigured(pin)),
        }
        self.inner.raise(pin, edge);
        Ok(())
    }
}

impl Drop for SimBoard {
    fn drop(&mut self) {
        let Some(handle) = lock(&self.dispatcher).take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            // Last owner released from inside a callback.
            let _ = self.inner.irq.try_send(Irq::Shutdown);
            return;
        }
        timer::block_on(self.inner.irq.send(Irq::Shutdown));
        let _ = handle.join();
    }
}

fn dispatch_loop(inner: &Inner) {
    loop {
        match timer::block_on(inner.irq.receive()) {
            Irq::Shutdown => break,
            Irq::Edge { pin, edge } => {
                let callbacks: Vec<EdgeCallback> = lock(&inner.callbacks)
                    .get(&pin)
                    .map(|v| {
                        v.iter()
                            .filter(|(e, _)| *e == edge)
                            .map(|(_, cb)| cb.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for cb in callbacks {
                    cb(pin);
                }
            }
        }
    }
    debug!("sim: IRQ dispatcher stopped");
}
