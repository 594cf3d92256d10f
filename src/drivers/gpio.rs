//! Digital pin abstraction.
//!
//! [`PinInterface`] is the board-level boundary: pin direction setup,
//! level reads and writes, and edge-triggered interrupt registration on
//! numbered pins.  Drivers never talk to it directly; they are written
//! against the `embedded-hal` 1.0 digital traits through the single-pin
//! adapters [`OutputLine`] and [`InputLine`].
//!
//! Interrupt callbacks run on the board's dispatch thread, one at a time,
//! in the order the edges occurred.

use std::sync::Arc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, PinState};

use crate::error::PinError;

/// Signal edge that triggers an interrupt callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// HIGH → LOW (an active-low switch closing).
    Falling,
    /// LOW → HIGH (an active-low switch opening).
    Rising,
}

/// Callback invoked with the pin number that fired.
pub type EdgeCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Board-level digital I/O.
pub trait PinInterface: Send + Sync {
    /// Configure `pin` as an input with pull-up.
    fn setup_input(&self, pin: i32) -> Result<(), PinError>;

    /// Configure `pin` as an output, initially LOW.
    fn setup_output(&self, pin: i32) -> Result<(), PinError>;

    fn read(&self, pin: i32) -> Result<PinState, PinError>;

    fn write(&self, pin: i32, state: PinState) -> Result<(), PinError>;

    /// Register `callback` for `edge` transitions on input `pin`.
    fn on_edge(&self, pin: i32, edge: Edge, callback: EdgeCallback) -> Result<(), PinError>;

    /// Synthesize an edge on `pin` as if the hardware had produced it.
    ///
    /// Only simulation boards support this.
    fn inject_edge(&self, _pin: i32, _edge: Edge) -> Result<(), PinError> {
        Err(PinError::Unsupported)
    }
}

// ---------------------------------------------------------------------------
// Single-pin embedded-hal adapters
// ---------------------------------------------------------------------------

/// One output pin of a board, usable as an `embedded_hal` [`OutputPin`].
#[derive(Clone)]
pub struct OutputLine {
    board: Arc<dyn PinInterface>,
    pin: i32,
}

impl OutputLine {
    pub fn new(board: Arc<dyn PinInterface>, pin: i32) -> Result<Self, PinError> {
        board.setup_output(pin)?;
        Ok(Self { board, pin })
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }
}

impl ErrorType for OutputLine {
    type Error = PinError;
}

impl OutputPin for OutputLine {
    fn set_low(&mut self) -> Result<(), PinError> {
        self.board.write(self.pin, PinState::Low)
    }

    fn set_high(&mut self) -> Result<(), PinError> {
        self.board.write(self.pin, PinState::High)
    }
}

/// One input pin of a board, usable as an `embedded_hal` [`InputPin`].
#[derive(Clone)]
pub struct InputLine {
    board: Arc<dyn PinInterface>,
    pin: i32,
}

impl InputLine {
    pub fn new(board: Arc<dyn PinInterface>, pin: i32) -> Result<Self, PinError> {
        board.setup_input(pin)?;
        Ok(Self { board, pin })
    }

    pub fn pin(&self) -> i32 {
        self.pin
    }

    /// Register an edge callback on this line.
    pub fn on_edge(&self, edge: Edge, callback: EdgeCallback) -> Result<(), PinError> {
        self.board.on_edge(self.pin, edge, callback)
    }

    pub fn inject_edge(&self, edge: Edge) -> Result<(), PinError> {
        self.board.inject_edge(self.pin, edge)
    }
}

impl ErrorType for InputLine {
    type Error = PinError;
}

impl InputPin for InputLine {
    fn is_high(&mut self) -> Result<bool, PinError> {
        Ok(self.board.read(self.pin)? == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, PinError> {
        Ok(self.board.read(self.pin)? == PinState::Low)
    }
}
