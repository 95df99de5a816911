//! Billing domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{MoneyError, TemporalError};
use crate::service::BillingStatus;
use crate::authorization::AuthorizationStatus;

/// Errors that can occur in the billing domain
#[derive(Debug, Error, PartialEq)]
pub enum BillingError {
    /// The billing-status graph does not allow this move
    #[error("Invalid billing status transition from {from} to {to}")]
    InvalidTransition {
        from: BillingStatus,
        to: BillingStatus,
    },

    /// Units, rate and documents are frozen once a service enters a claim
    #[error("Service is locked in status {status}")]
    ServiceLocked {
        status: BillingStatus,
    },

    /// Not enough authorized units remain
    #[error("Insufficient authorization units: requested {requested}, remaining {remaining}")]
    InsufficientUnits {
        requested: Decimal,
        remaining: Decimal,
    },

    /// Reservations are only accepted by active authorizations
    #[error("Authorization is {status}, not ACTIVE")]
    AuthorizationInactive {
        status: AuthorizationStatus,
    },

    /// Units must be strictly positive
    #[error("Units must be positive, got {0}")]
    InvalidUnits(Decimal),

    /// Rate or amount is not usable
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Used units fell outside `0..=authorized`
    #[error("Authorization bounds violated: used {used} of {authorized}")]
    UnitBoundsViolated {
        used: Decimal,
        authorized: Decimal,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),
}
