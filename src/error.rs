//! Crate-wide error taxonomy.
//!
//! Configuration errors are rejected before an engine ever exists. Illegal
//! transitions and missing-engine calls are reported with enough context for
//! an HTTP handler to pick a status code without exposing internals.

use thiserror::Error;

/// A single configuration constraint violation, identified by a dotted field
/// path so that `/config/validate` can report every problem in one payload
/// instead of stopping at the first one.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldError {
    /// Dotted field path, e.g. `"scooters.swap_threshold"`.
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Top-level crate error. Each variant corresponds to one entry in the
/// error-handling taxonomy: configuration, illegal transitions, and
/// missing-state calls against the control surface.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration rejected ({} error(s))", .0.len())]
    InvalidConfig(Vec<FieldError>),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("no configuration set")]
    NoConfig,

    #[error("no simulation engine initialized")]
    NoEngine,

    #[error("speed multiplier {0} out of range [0.1, 100]")]
    SpeedOutOfRange(f64),
}

impl SimError {
    /// Maps an error to the HTTP status code §6 specifies for it.
    pub fn status_code(&self) -> u16 {
        match self {
            SimError::InvalidConfig(_) => 400,
            SimError::IllegalTransition(_) => 400,
            SimError::NoConfig => 400,
            SimError::NoEngine => 400,
            SimError::SpeedOutOfRange(_) => 422,
        }
    }
}
