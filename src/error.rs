//! Unified error types for the TuxEatPi core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! callers' error handling uniform.  Nested enums carry the details for
//! configuration, pin (HAL) and link (message boundary) failures.
//!
//! A transmission left without an answer is not an error: it surfaces as
//! `None`.

use core::fmt;

use crate::wings::WingState;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration or pin assignment is missing or invalid.
    Config(ConfigError),
    /// No limit switch closed within the calibration window.
    Calibration { timeout_ms: u32 },
    /// Movement requested before a successful calibration.
    NotCalibrated,
    /// Movement target outside `{Up, Down}`.
    InvalidTarget(String),
    /// The expected limit switch never closed during an activation.
    StuckActuator { target: WingState, timeout_ms: u32 },
    /// The actuator command queue is full.
    Busy,
    /// A digital pin operation failed.
    Pin(PinError),
    /// The message-passing boundary failed.
    Link(LinkError),
    /// A worker thread could not be started.
    Thread(std::io::ErrorKind),
    /// An aptitude received a command it does not implement.
    UnknownCommand(String),
    /// Command arguments were missing or malformed.
    BadArguments(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Calibration { timeout_ms } => {
                write!(f, "calibration: no limit switch closed within {timeout_ms} ms")
            }
            Self::NotCalibrated => write!(f, "actuator not calibrated"),
            Self::InvalidTarget(t) => write!(f, "invalid target position: {t:?}"),
            Self::StuckActuator { target, timeout_ms } => write!(
                f,
                "stuck actuator: {target} end-stop not reached within {timeout_ms} ms"
            ),
            Self::Busy => write!(f, "actuator command queue full"),
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Thread(kind) => write!(f, "thread spawn failed: {kind}"),
            Self::UnknownCommand(c) => write!(f, "unknown command: {c}"),
            Self::BadArguments(msg) => write!(f, "bad arguments: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required pin role is absent from the assignment.
    MissingPin(&'static str),
    /// A pin role maps to an unusable identifier.
    InvalidPin { role: &'static str, pin: i32 },
    /// Two roles share the same physical pin.
    DuplicatePin(i32),
    /// A tunable failed range validation.
    ValidationFailed(&'static str),
    /// The configuration document could not be parsed.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPin(role) => write!(f, "missing pin role '{role}'"),
            Self::InvalidPin { role, pin } => write!(f, "invalid pin {pin} for role '{role}'"),
            Self::DuplicatePin(pin) => write!(f, "pin {pin} assigned to more than one role"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Pin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// The pin was never set up on this board.
    Unconfigured(i32),
    /// The pin is configured in the other direction.
    WrongMode(i32),
    /// The board does not support the requested operation.
    Unsupported,
    /// The underlying HAL reported a failure.
    Hal,
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured(pin) => write!(f, "pin {pin} not configured"),
            Self::WrongMode(pin) => write!(f, "pin {pin} configured in the wrong direction"),
            Self::Unsupported => write!(f, "operation not supported by this board"),
            Self::Hal => write!(f, "HAL failure"),
        }
    }
}

impl embedded_hal::digital::Error for PinError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The peer has gone away.
    Closed,
    /// The peer mailbox stayed full for the whole send window.
    Full,
    /// Byte-stream I/O failed.
    Io(std::io::ErrorKind),
    /// A frame could not be encoded or decoded.
    Codec(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "peer closed"),
            Self::Full => write!(f, "peer mailbox full"),
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::Codec(msg) => write!(f, "codec error: {msg}"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
