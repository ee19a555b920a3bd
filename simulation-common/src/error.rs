use thiserror::Error;

/// Errors raised by the simulation engine before or during a run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A parameter is outside the range the model is defined for.
    /// The run must not proceed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::InvalidParameter(msg.into())
    }
}
