//! Signals and lifecycle events
//!
//! `Signal`s are advisory and go to the observability port the moment they
//! happen, even inside a transaction that later rolls back.
//! `LifecycleEvent`s describe committed changes and are only dispatched
//! after commit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{AuthorizationId, ClaimId, PaymentId, ServiceId};
use domain_billing::{BillingStatus, UtilizationLevel};
use domain_claims::ClaimStatus;
use domain_payment::ReconciliationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSeverity {
    Warning,
    Critical,
}

/// Advisory signal for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// An authorization crossed into a higher utilization band
    AuthorizationUtilization {
        authorization_id: AuthorizationId,
        level: UtilizationLevel,
        utilization_percent: Decimal,
        remaining_units: Decimal,
    },
    /// A status change was refused
    TransitionRejected {
        entity: String,
        id: String,
        from: String,
        to: String,
    },
}

impl Signal {
    pub fn severity(&self) -> SignalSeverity {
        match self {
            Signal::AuthorizationUtilization { level: UtilizationLevel::Critical, .. } => {
                SignalSeverity::Critical
            }
            Signal::AuthorizationUtilization { .. } | Signal::TransitionRejected { .. } => {
                SignalSeverity::Warning
            }
        }
    }
}

/// A committed change other systems may want to hear about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ServiceRecorded {
        service_id: ServiceId,
    },
    ServiceUpdated {
        service_id: ServiceId,
    },
    ServiceStatusChanged {
        service_id: ServiceId,
        from: BillingStatus,
        to: BillingStatus,
    },
    ServicesImported {
        succeeded: usize,
        failed: usize,
    },
    ClaimCreated {
        claim_id: ClaimId,
        claim_number: String,
    },
    ClaimStatusChanged {
        claim_id: ClaimId,
        from: ClaimStatus,
        to: ClaimStatus,
    },
    PaymentRecorded {
        payment_id: PaymentId,
    },
    PaymentReconciled {
        payment_id: PaymentId,
        status: ReconciliationStatus,
    },
    ReconciliationUndone {
        payment_id: PaymentId,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ServiceRecorded { .. } => "service_recorded",
            LifecycleEvent::ServiceUpdated { .. } => "service_updated",
            LifecycleEvent::ServiceStatusChanged { .. } => "service_status_changed",
            LifecycleEvent::ServicesImported { .. } => "services_imported",
            LifecycleEvent::ClaimCreated { .. } => "claim_created",
            LifecycleEvent::ClaimStatusChanged { .. } => "claim_status_changed",
            LifecycleEvent::PaymentRecorded { .. } => "payment_recorded",
            LifecycleEvent::PaymentReconciled { .. } => "payment_reconciled",
            LifecycleEvent::ReconciliationUndone { .. } => "reconciliation_undone",
        }
    }
}
