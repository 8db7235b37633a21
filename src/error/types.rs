use std::io;

use thiserror::Error;

use crate::logging::LoggingError;

/// Unified result type for the Katona engine crate.
pub type Result<T> = std::result::Result<T, KatonaError>;

/// Errors surfaced by the experiment engine.
///
/// Everything here is fatal for the current session. Normal interaction
/// mistakes (choosing an empty cell, placing on a mismatched cell) never
/// produce a `KatonaError`.
#[derive(Debug, Error)]
pub enum KatonaError {
    #[error("five-square lattice requires an odd square count, got {0}")]
    InvalidLattice(usize),
    #[error("lattice of {0} squares does not fit in memory")]
    LatticeTooLarge(usize),
    #[error("cell {0} is outside the lattice")]
    CellOutOfLattice(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("event `{0}` is not registered with the bus")]
    UnknownEvent(String),
    #[error("handler {0} was re-entered while still running")]
    ReentrantHandler(u64),
    #[error("key `{key}` is prohibited for {probe} probe")]
    ProhibitedKey { probe: String, key: String },
    #[error("backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Instrumentation noise that is reported but never ends a session.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{component}: {problem}")]
pub struct ProtocolViolation {
    pub component: &'static str,
    pub problem: String,
}

impl ProtocolViolation {
    pub fn new(component: &'static str, problem: impl Into<String>) -> Self {
        Self {
            component,
            problem: problem.into(),
        }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors raised while driving a session from a real terminal.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("session error: {0}")]
    Session(#[from] KatonaError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
