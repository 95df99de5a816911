//! Payment domain errors

use thiserror::Error;

use core_kernel::{Money, MoneyError};

/// Errors that can occur in the payment domain
#[derive(Debug, Error, PartialEq)]
pub enum PaymentError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// No set of candidate claims absorbs the whole payment
    #[error("No usable match: {unallocated} would remain unallocated")]
    NoUsableMatch { unallocated: Money },

    #[error("Allocated {allocated} exceeds payment amount {amount}")]
    Overallocated { allocated: Money, amount: Money },

    #[error("Invalid remittance advice: {0}")]
    InvalidRemittance(String),

    #[error(transparent)]
    Money(#[from] MoneyError),
}
