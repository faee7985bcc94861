//! Error types for assembling and simulating a mass-spring system.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = SimError> = std::result::Result<T, E>;

/// Everything that can go wrong while building or stepping a system.
#[derive(Debug, Error)]
pub enum SimError {
    /// A numeric argument was out of range (mass, stiffness, rest length, dt)
    /// or a spring/constraint was attached to the same entity twice.
    #[error("invalid parameter `{what}`: {value}")]
    InvalidParameter { what: &'static str, value: String },

    /// A handle does not belong to the system it was used with.
    #[error("dangling {kind} handle #{index} (system {handle_system}, expected {system})")]
    DanglingReference {
        kind: &'static str,
        index: usize,
        handle_system: u64,
        system: u64,
    },

    /// A spring collapsed to zero length, so its force direction is undefined.
    #[error("spring #{spring} has zero length at step {step}")]
    DegenerateGeometry { spring: usize, step: usize },

    /// Integration produced a non-finite position or velocity.
    #[error("non-finite state after step {step} (t = {time})")]
    NumericalInstability { step: usize, time: f64 },

    /// The driver already halted and refuses to step again.
    #[error("simulation halted at step {step}")]
    Halted { step: usize },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub(crate) fn invalid(what: &'static str, value: impl ToString) -> Self {
        Self::InvalidParameter {
            what,
            value: value.to_string(),
        }
    }
}
