#![allow(dead_code)] // Unified funnel reserved for adapters that need one error type

//! Unified error types for the FlexRig firmware.
//!
//! Every fallible motion or protocol operation has an explicit result
//! type; they all funnel into [`Error`] so the session loop — the single
//! top-level dispatcher — can perform the stop/rescue/home recovery with
//! uniform handling.  Variants are `Copy` so they pass through the
//! control path without allocation.

use core::fmt;

use crate::ports::HallId;

// ---------------------------------------------------------------------------
// Seek outcome
// ---------------------------------------------------------------------------

/// Outcome of a single [`seek`](crate::motion::homing::seek) toward a
/// Hall sensor.  Not an error by itself: the caller decides what a
/// timeout means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult {
    /// The target sensor went active; motor stopped on it.
    Found,
    /// The pulse budget ran out first; motor stopped wherever it was.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Homing errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingError {
    /// The 0° sensor never triggered within the odometric timeout.
    ZeroNotFound,
    /// The far sensor never triggered within the odometric timeout.
    FarNotFound,
}

impl fmt::Display for HomingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroNotFound => write!(f, "sensor 0 no encontrado"),
            Self::FarNotFound => write!(f, "sensor final no encontrado"),
        }
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A calibration cycle timed out before reaching the opposite sensor.
    CycleTimedOut { cycle: u8 },
    /// The final return-to-home after calibration failed.
    HomingFailed(HomingError),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CycleTimedOut { cycle } => {
                write!(f, "ciclo de calibracion {} sin sensor", cycle)
            }
            Self::HomingFailed(e) => write!(f, "retorno a home fallido: {}", e),
        }
    }
}

impl From<HomingError> for CalibrationError {
    fn from(e: HomingError) -> Self {
        Self::HomingFailed(e)
    }
}

// ---------------------------------------------------------------------------
// Point-to-point move errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    /// A Hall sensor triggered where the move did not expect one.
    /// Hard interlock: the motor is already stopped when this returns.
    Interlocked(HallId),
    /// The preliminary homing pass failed.
    HomingFailed(HomingError),
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interlocked(HallId::Zero) => write!(f, "sensor 0 inesperado"),
            Self::Interlocked(HallId::Far) => write!(f, "sensor final inesperado"),
            Self::HomingFailed(e) => write!(f, "{}", e),
        }
    }
}

impl From<HomingError> for MoveError {
    fn from(e: HomingError) -> Self {
        Self::HomingFailed(e)
    }
}

// ---------------------------------------------------------------------------
// Mode-tick errors
// ---------------------------------------------------------------------------

/// A fault caught at the mode-handler boundary.  The session stops the
/// motor, drives home, and reports `ERROR en modo N: <detail>`; the
/// session itself stays RUNNING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeError {
    Calibration(CalibrationError),
    Homing(HomingError),
    Move(MoveError),
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calibration(e) => write!(f, "{}", e),
            Self::Homing(e) => write!(f, "{}", e),
            Self::Move(e) => write!(f, "{}", e),
        }
    }
}

impl From<CalibrationError> for ModeError {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

impl From<HomingError> for ModeError {
    fn from(e: HomingError) -> Self {
        Self::Homing(e)
    }
}

impl From<MoveError> for ModeError {
    fn from(e: MoveError) -> Self {
        Self::Move(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

/// A malformed or unsupported host line.  Reported as an `ERROR:` line;
/// the session stays in IDLE and fully recovers.
///
/// The display strings are part of the wire protocol — the host matches
/// on them — so they stay in the vocabulary the original host shipped
/// with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Neither `modo` nor `mode` present in the activation payload.
    MissingMode,
    /// A `mode` value that contains no digits at all.
    ModeNotNumeric,
    /// A mode number outside 1..=4.
    UnsupportedMode,
    /// The line is not a dict-shaped payload.
    BadPayload,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMode => write!(f, "falta 'modo' o 'mode'"),
            Self::ModeNotNumeric => write!(f, "'mode/modo' debe contener 1..4"),
            Self::UnsupportedMode => write!(f, "'modo' debe ser 1..4"),
            Self::BadPayload => write!(f, "Formato no reconocido (usa dict JSON)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Homing(HomingError),
    Calibration(CalibrationError),
    Move(MoveError),
    Mode(ModeError),
    Protocol(ProtocolError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Homing(e) => write!(f, "homing: {}", e),
            Self::Calibration(e) => write!(f, "calibracion: {}", e),
            Self::Move(e) => write!(f, "movimiento: {}", e),
            Self::Mode(e) => write!(f, "modo: {}", e),
            Self::Protocol(e) => write!(f, "protocolo: {}", e),
            Self::Init(msg) => write!(f, "init: {}", msg),
        }
    }
}

impl From<HomingError> for Error {
    fn from(e: HomingError) -> Self {
        Self::Homing(e)
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

impl From<MoveError> for Error {
    fn from(e: MoveError) -> Self {
        Self::Move(e)
    }
}

impl From<ModeError> for Error {
    fn from(e: ModeError) -> Self {
        Self::Mode(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
