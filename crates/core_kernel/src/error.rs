//! Kernel error type
//!
//! Wraps the value-type errors so callers that touch several kernel types
//! can use one `?`.

use thiserror::Error;
use crate::money::MoneyError;
use crate::temporal::TemporalError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Temporal error: {0}")]
    Temporal(#[from] TemporalError),

    /// A configured value (timezone, currency code, ...) is not recognised
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
