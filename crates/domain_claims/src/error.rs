//! Claims domain errors

use thiserror::Error;

use core_kernel::MoneyError;
use crate::claim::ClaimStatus;

/// Errors that can occur in the claims domain
#[derive(Debug, Error, PartialEq)]
pub enum ClaimError {
    #[error("Invalid claim status transition from {from} to {to}")]
    InvalidStatusTransition { from: ClaimStatus, to: ClaimStatus },

    #[error("Claim in status {0} cannot receive payment")]
    NotPayable(ClaimStatus),

    #[error("Claim in status {0} is not PAID")]
    NotPaid(ClaimStatus),

    #[error("Invalid related claim: {0}")]
    InvalidRelatedClaim(String),

    #[error("A claim needs at least one service")]
    NoServices,

    #[error(transparent)]
    Money(#[from] MoneyError),
}
