//! Error module orchestrator.
//!
//! Call sites import the crate error from here while the variants live in the
//! private `types` module.

mod types;

pub use types::{DriverError, DriverResult, KatonaError, ProtocolViolation, Result};
