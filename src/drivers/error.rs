use thiserror::Error;
use crate::types::{AcquisitionState, Action};
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("no serial port available; connect a device and refresh ports")]
    NoPortAvailable,
    #[error("failed to open serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error("transport I/O error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: Action,
        state: AcquisitionState,
    },
    #[error("insufficient data: need at least {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("sample interval must be positive and finite, got {0}")]
    InvalidSampleInterval(f64),
    #[error("recording error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
/// Reasons a single frame is dropped by the ingestor. Never escalated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is not valid UTF-8")]
    Decode(#[from] std::str::Utf8Error),
    #[error("frame contains no decimal digits")]
    NoDigits,
    #[error("digit run {0:?} does not fit in a raw code")]
    Overflow(String),
}
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed sample row at line {line}: {content:?}")]
    Malformed { line: usize, content: String },
    #[error("recorder is already armed")]
    AlreadyArmed,
}
