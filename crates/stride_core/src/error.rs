use thiserror::Error;

/// Fatal failures of an adaptive integration run.
///
/// Inner retry-budget exhaustion is deliberately absent: it is a recoverable
/// diagnostic counted on the trajectory, not a failure.
#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    #[error("invalid controller configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid integration domain: {reason}")]
    InvalidDomain { reason: String },

    #[error("outer budget of {steps} macro-steps exhausted at x = {x_reached} before the right endpoint")]
    OuterBudgetExceeded { steps: usize, x_reached: f64 },

    #[error("non-finite state produced at x = {x}")]
    NonFiniteState { x: f64 },
}
