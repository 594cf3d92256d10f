//! Wing actuator: calibration and movement state machine.
//!
//! One [`WingActuator`] owns the two end-stop switch inputs and the wing
//! motor.  Two threads touch its state:
//!
//! ```text
//!   callers ──move_*()──▶ command queue ──▶ control thread ──▶ WingMotor
//!                                               ▲
//!   board IRQ dispatch ──switch closed──────────┘ (halt + record state)
//!          │
//!          └──────────────▶ EventChannel ──▶ observers
//! ```
//!
//! Movement calls validate synchronously and return immediately; the
//! control thread executes them FIFO.  Progress is observed by polling
//! [`WingActuator::get_position`] / [`WingActuator::is_moving`], or by
//! [`WingActuator::wait_idle`].

mod control;

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embedded_hal::digital::InputPin;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::adapters::time::Clock;
use crate::config::WingsConfig;
use crate::drivers::gpio::{Edge, InputLine, OutputLine, PinInterface};
use crate::drivers::motor::{Direction, WingMotor};
use crate::drivers::task;
use crate::error::{ConfigError, Error, Result};
use crate::events::{ComponentName, EventChannel};
use crate::pins::PinAssignment;
use crate::timer;

use control::{Activity, Command, Recorded};

/// Movement commands that may wait behind the one executing.
pub const COMMAND_QUEUE_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WingState {
    Unknown,
    Calibrating,
    Up,
    Down,
    Moving,
}

impl WingState {
    /// End-stop this state rests against, for the two stable states.
    pub fn end_stop(self) -> Option<Direction> {
        match self {
            Self::Up => Some(Direction::Up),
            Self::Down => Some(Direction::Down),
            _ => None,
        }
    }

    pub fn is_stable(self) -> bool {
        self.end_stop().is_some()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Calibrating => "calibrating",
            Self::Up => "up",
            Self::Down => "down",
            Self::Moving => "moving",
        }
    }
}

impl From<Direction> for WingState {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => Self::Up,
            Direction::Down => Self::Down,
        }
    }
}

impl fmt::Display for WingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WingState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "calibrating" => Ok(Self::Calibrating),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "moving" => Ok(Self::Moving),
            _ => Err(Error::InvalidTarget(s.to_owned())),
        }
    }
}

/// Which limit switch.  The left switch is the up end-stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Logical switch name carried by events.
    pub const fn switch_name(self) -> &'static str {
        match self {
            Self::Left => "left_switch",
            Self::Right => "right_switch",
        }
    }

    /// End-stop this switch detects.
    pub const fn end_stop(self) -> Direction {
        match self {
            Self::Left => Direction::Up,
            Self::Right => Direction::Down,
        }
    }

    pub const fn for_end_stop(end: Direction) -> Self {
        match end {
            Direction::Up => Self::Left,
            Direction::Down => Self::Right,
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(Error::BadArguments(format!("unknown side {s:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) struct Shared {
    component: ComponentName,
    pins: PinAssignment,
    default_direction: Direction,
    calibration_timeout: Duration,
    watchdog: Duration,

    left: InputLine,
    right: InputLine,
    /// Lock order: `recorded` before `motor`.
    recorded: Mutex<Recorded>,
    motor: Mutex<WingMotor<OutputLine, OutputLine>>,
    /// Raised by the switch callback when the sought end-stop closes.
    reached: Signal<CriticalSectionRawMutex, Direction>,

    commands: Channel<CriticalSectionRawMutex, Command, COMMAND_QUEUE_DEPTH>,
    /// Queued plus executing commands.
    pending: AtomicUsize,
    idle: Signal<CriticalSectionRawMutex, ()>,
    shutdown: AtomicBool,
    last_error: Mutex<Option<Error>>,

    events: Arc<EventChannel>,
    clock: Clock,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn switch(&self, side: Side) -> &InputLine {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn switch_closed(&self, side: Side) -> Result<bool> {
        let mut line = self.switch(side).clone();
        Ok(line.is_low()?)
    }
}

// ---------------------------------------------------------------------------
// WingActuator
// ---------------------------------------------------------------------------

/// One physical wing: two end-stop switches and a reversible motor.
pub struct WingActuator {
    shared: Arc<Shared>,
    control: Option<JoinHandle<()>>,
}

impl WingActuator {
    /// Build and calibrate.
    ///
    /// Fails with [`Error::Config`] on a bad pin assignment and with
    /// [`Error::Calibration`] if no end-stop is found in time.
    pub fn new(
        board: Arc<dyn PinInterface>,
        config: &WingsConfig,
        events: Arc<EventChannel>,
    ) -> Result<Self> {
        let actuator = Self::uncalibrated(board, config, events)?;
        let state = actuator.recalibrate()?;
        info!("WINGS[{}]: ready at {}", actuator.component(), state);
        Ok(actuator)
    }

    /// Build without calibrating.  The actuator starts in
    /// [`WingState::Unknown`] and rejects movement until
    /// [`recalibrate`](Self::recalibrate) succeeds.
    pub fn uncalibrated(
        board: Arc<dyn PinInterface>,
        config: &WingsConfig,
        events: Arc<EventChannel>,
    ) -> Result<Self> {
        config.validate()?;
        let pins = config.pins;
        let component = ComponentName::try_from(config.component.as_str())
            .map_err(|()| ConfigError::ValidationFailed("wings.component too long"))?;

        let left = InputLine::new(board.clone(), pins.left_switch)?;
        let right = InputLine::new(board.clone(), pins.right_switch)?;
        let motor = WingMotor::new(
            OutputLine::new(board.clone(), pins.movement)?,
            OutputLine::new(board, pins.position)?,
        )?;

        let shared = Arc::new(Shared {
            component,
            pins,
            default_direction: config.default_direction,
            calibration_timeout: config.calibration_timeout(),
            watchdog: config.watchdog_timeout(),
            left,
            right,
            recorded: Mutex::new(Recorded {
                state: WingState::Unknown,
                activity: Activity::Idle,
                off_stop: false,
            }),
            motor: Mutex::new(motor),
            reached: Signal::new(),
            commands: Channel::new(),
            pending: AtomicUsize::new(0),
            idle: Signal::new(),
            shutdown: AtomicBool::new(false),
            last_error: Mutex::new(None),
            events,
            clock: Clock::new(),
        });

        for side in [Side::Left, Side::Right] {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            shared.switch(side).on_edge(
                Edge::Falling,
                Arc::new(move |pin| {
                    if let Some(shared) = weak.upgrade() {
                        control::on_switch_closed(&shared, side, pin);
                    }
                }),
            )?;
        }

        let worker = shared.clone();
        let handle = task::spawn_named("wings-ctl", task::DEFAULT_STACK_KB, move || {
            control::control_loop(&worker);
        })
        .map_err(|e| Error::Thread(e.kind()))?;

        info!(
            "WINGS[{}]: pins left={} right={} position={} movement={}",
            shared.component, pins.left_switch, pins.right_switch, pins.position, pins.movement
        );

        Ok(Self {
            shared,
            control: Some(handle),
        })
    }

    /// Find an end-stop and adopt it as the rest state.
    ///
    /// Waits behind any queued movement.  On failure the actuator is
    /// left in [`WingState::Unknown`].
    pub fn recalibrate(&self) -> Result<WingState> {
        let reply = Arc::new(Signal::new());
        self.enqueue(Command::Calibrate(reply.clone()))?;
        timer::block_on(reply.wait())
    }

    /// Last confirmed stable state, `Calibrating` while calibrating,
    /// `Unknown` before a successful calibration.
    pub fn get_position(&self) -> WingState {
        lock(&self.shared.recorded).state
    }

    /// Like [`get_position`](Self::get_position) but reports `Moving`
    /// while the motor is energised.
    pub fn state(&self) -> WingState {
        let recorded = lock(&self.shared.recorded);
        if recorded.state == WingState::Calibrating {
            return WingState::Calibrating;
        }
        if lock(&self.shared.motor).is_running() {
            WingState::Moving
        } else {
            recorded.state
        }
    }

    pub fn is_moving(&self) -> bool {
        lock(&self.shared.motor).is_running()
    }

    /// Drive toward `target` (`Up` or `Down`).  No motor engagement if
    /// the wing already rests there when the command runs.
    pub fn move_to_position(&self, target: WingState) -> Result<()> {
        let Some(end) = target.end_stop() else {
            return Err(Error::InvalidTarget(target.to_string()));
        };
        self.require_calibrated()?;
        self.enqueue(Command::MoveTo(end))
    }

    /// `count` swings, each toward the end-stop opposite the current one.
    pub fn move_count(&self, count: u32) -> Result<()> {
        self.require_calibrated()?;
        if count == 0 {
            return Ok(());
        }
        self.enqueue(Command::Count(count))
    }

    /// Energise the motor in the default direction for `duration`.
    pub fn move_time(&self, duration: Duration) -> Result<()> {
        self.require_calibrated()?;
        self.enqueue(Command::Timed(duration))
    }

    /// Synthesise a closure of one limit switch.
    ///
    /// Test hook: only boards that can inject edges support it.
    pub fn push_wing(&self, side: Side) -> Result<()> {
        self.shared.switch(side).inject_edge(Edge::Falling)?;
        Ok(())
    }

    /// Whether the given limit switch currently reads closed.
    pub fn switch_closed(&self, side: Side) -> Result<bool> {
        self.shared.switch_closed(side)
    }

    /// Block until every queued command has finished, at most `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Short slices: a signal raised before we started waiting is
            // not missed for long.
            let slice = (deadline - now).min(Duration::from_millis(10));
            let _ = timer::block_on_timeout(self.shared.idle.wait(), slice);
        }
    }

    /// Take the last asynchronous movement failure, if any.
    pub fn take_error(&self) -> Option<Error> {
        lock(&self.shared.last_error).take()
    }

    pub fn pins(&self) -> PinAssignment {
        self.shared.pins
    }

    pub fn component(&self) -> &str {
        self.shared.component.as_str()
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.shared.events
    }

    fn require_calibrated(&self) -> Result<()> {
        match lock(&self.shared.recorded).state {
            WingState::Unknown => Err(Error::NotCalibrated),
            _ => Ok(()),
        }
    }

    fn enqueue(&self, cmd: Command) -> Result<()> {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if self.shared.commands.try_send(cmd).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            warn!("WINGS[{}]: command queue full", self.shared.component);
            return Err(Error::Busy);
        }
        Ok(())
    }
}

impl Drop for WingActuator {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.control.take() {
            if !handle.is_finished() {
                timer::block_on(self.shared.commands.send(Command::Shutdown));
            }
            let _ = handle.join();
        }
    }
}
