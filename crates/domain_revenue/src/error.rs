//! Engine error taxonomy
//!
//! Every failure leaving the engine is one of four kinds. Business-rule
//! rejections carry a machine-readable `ReasonCode` so callers can branch
//! without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use core_kernel::{MoneyError, PortError, TemporalError};
use domain_billing::BillingError;
use domain_claims::ClaimError;
use domain_payment::PaymentError;

/// Machine-readable reason for a business-rule rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    InvalidBillingStatusTransition,
    InvalidClaimStatusTransition,
    AuthorizationUnitsExceeded,
    AuthorizationInactive,
    ServiceLocked,
    ServiceNotReady,
    /// READY_FOR_BILLING is only reachable through the readiness validator
    ValidationRequired,
    /// The target status is driven by the owning claim
    ClaimDrivenTransition,
    ClientMismatch,
    PartyInactive,
    PayerMismatch,
    PaymentAmountExceeded,
    ClaimAmountExceeded,
    ClaimNotPayable,
    ClaimNotPaid,
    ClaimServicesSettled,
    InvalidRelatedClaim,
    NoUsableMatch,
    PaymentAlreadyReconciled,
    CurrencyMismatch,
    HistoryInconsistent,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::InvalidBillingStatusTransition => "invalid-billing-status-transition",
            ReasonCode::InvalidClaimStatusTransition => "invalid-claim-status-transition",
            ReasonCode::AuthorizationUnitsExceeded => "authorization-units-exceeded",
            ReasonCode::AuthorizationInactive => "authorization-inactive",
            ReasonCode::ServiceLocked => "service-locked",
            ReasonCode::ServiceNotReady => "service-not-ready",
            ReasonCode::ValidationRequired => "validation-required",
            ReasonCode::ClaimDrivenTransition => "claim-driven-transition",
            ReasonCode::ClientMismatch => "client-mismatch",
            ReasonCode::PartyInactive => "party-inactive",
            ReasonCode::PayerMismatch => "payer-mismatch",
            ReasonCode::PaymentAmountExceeded => "payment-amount-exceeded",
            ReasonCode::ClaimAmountExceeded => "claim-amount-exceeded",
            ReasonCode::ClaimNotPayable => "claim-not-payable",
            ReasonCode::ClaimNotPaid => "claim-not-paid",
            ReasonCode::ClaimServicesSettled => "claim-services-settled",
            ReasonCode::InvalidRelatedClaim => "invalid-related-claim",
            ReasonCode::NoUsableMatch => "no-usable-match",
            ReasonCode::PaymentAlreadyReconciled => "payment-already-reconciled",
            ReasonCode::CurrencyMismatch => "currency-mismatch",
            ReasonCode::HistoryInconsistent => "history-inconsistent",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
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

fn describe(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum RevenueError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation failed: {}", describe(.0))]
    Validation(Vec<FieldError>),

    #[error("{code}: {message}")]
    BusinessRule { code: ReasonCode, message: String },

    #[error("Infrastructure error: {0}")]
    Infra(PortError),
}

impl RevenueError {
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        RevenueError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        RevenueError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn business(code: ReasonCode, message: impl Into<String>) -> Self {
        RevenueError::BusinessRule {
            code,
            message: message.into(),
        }
    }

    /// The reason code of a business-rule rejection
    pub fn reason_code(&self) -> Option<ReasonCode> {
        match self {
            RevenueError::BusinessRule { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RevenueError::NotFound { .. })
    }

    /// Infrastructure failures that a read may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, RevenueError::Infra(e) if e.is_transient())
    }
}

impl From<PortError> for RevenueError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => {
                RevenueError::NotFound { entity: entity_type, id }
            }
            PortError::Validation { message, field } => {
                RevenueError::Validation(vec![FieldError::new(field.unwrap_or_default(), message)])
            }
            other => RevenueError::Infra(other),
        }
    }
}

impl From<MoneyError> for RevenueError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::Overflow(_) => RevenueError::validation("amount", err.to_string()),
            other => RevenueError::business(ReasonCode::CurrencyMismatch, other.to_string()),
        }
    }
}

impl From<TemporalError> for RevenueError {
    fn from(err: TemporalError) -> Self {
        RevenueError::validation("service_date", err.to_string())
    }
}

impl From<BillingError> for RevenueError {
    fn from(err: BillingError) -> Self {
        let message = err.to_string();
        match err {
            BillingError::InvalidTransition { .. } => {
                RevenueError::business(ReasonCode::InvalidBillingStatusTransition, message)
            }
            BillingError::ServiceLocked { .. } => {
                RevenueError::business(ReasonCode::ServiceLocked, message)
            }
            BillingError::InsufficientUnits { .. } | BillingError::UnitBoundsViolated { .. } => {
                RevenueError::business(ReasonCode::AuthorizationUnitsExceeded, message)
            }
            BillingError::AuthorizationInactive { .. } => {
                RevenueError::business(ReasonCode::AuthorizationInactive, message)
            }
            BillingError::InvalidUnits(_) => RevenueError::validation("units", message),
            BillingError::InvalidAmount(_) => RevenueError::validation("rate", message),
            BillingError::Money(e) => e.into(),
            BillingError::Temporal(e) => e.into(),
        }
    }
}

impl From<ClaimError> for RevenueError {
    fn from(err: ClaimError) -> Self {
        let message = err.to_string();
        match err {
            ClaimError::InvalidStatusTransition { .. } => {
                RevenueError::business(ReasonCode::InvalidClaimStatusTransition, message)
            }
            ClaimError::NotPayable(_) => {
                RevenueError::business(ReasonCode::ClaimNotPayable, message)
            }
            ClaimError::NotPaid(_) => RevenueError::business(ReasonCode::ClaimNotPaid, message),
            ClaimError::InvalidRelatedClaim(_) => {
                RevenueError::business(ReasonCode::InvalidRelatedClaim, message)
            }
            ClaimError::NoServices => RevenueError::validation("service_ids", message),
            ClaimError::Money(e) => e.into(),
        }
    }
}

impl From<PaymentError> for RevenueError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::InvalidAmount(_) => RevenueError::validation("amount", message),
            PaymentError::NoUsableMatch { .. } => {
                RevenueError::business(ReasonCode::NoUsableMatch, message)
            }
            PaymentError::Overallocated { .. } => {
                RevenueError::business(ReasonCode::PaymentAmountExceeded, message)
            }
            PaymentError::InvalidRemittance(_) => RevenueError::validation("remittance", message),
            PaymentError::Money(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for RevenueError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(field.to_string(), message)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        RevenueError::Validation(fields)
    }
}
