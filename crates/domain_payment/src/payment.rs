//! Payments received from payers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Money, PayerId, PaymentId};
use crate::error::PaymentError;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Paper check
    Check,
    /// Electronic funds transfer
    Eft,
    /// ACH transfer
    Ach,
    /// Card payment
    CreditCard,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Check => "CHECK",
            PaymentMethod::Eft => "EFT",
            PaymentMethod::Ach => "ACH",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CHECK" => Some(PaymentMethod::Check),
            "EFT" => Some(PaymentMethod::Eft),
            "ACH" => Some(PaymentMethod::Ach),
            "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            "OTHER" => Some(PaymentMethod::Other),
            _ => None,
        }
    }
}

/// How much of a payment has been applied to claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationStatus {
    Unreconciled,
    PartiallyReconciled,
    Reconciled,
}

impl ReconciliationStatus {
    /// The single derivation of a payment's status from its allocated sum
    pub fn derive(allocated: &Money, payment_amount: &Money) -> Self {
        if allocated.settles(payment_amount) || allocated > payment_amount {
            ReconciliationStatus::Reconciled
        } else if allocated.is_positive() {
            ReconciliationStatus::PartiallyReconciled
        } else {
            ReconciliationStatus::Unreconciled
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReconciliationStatus::Unreconciled => "UNRECONCILED",
            ReconciliationStatus::PartiallyReconciled => "PARTIALLY_RECONCILED",
            ReconciliationStatus::Reconciled => "RECONCILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNRECONCILED" => Some(ReconciliationStatus::Unreconciled),
            "PARTIALLY_RECONCILED" => Some(ReconciliationStatus::PartiallyReconciled),
            "RECONCILED" => Some(ReconciliationStatus::Reconciled),
            _ => None,
        }
    }
}

/// A payment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique identifier
    pub id: PaymentId,
    /// Paying organisation
    pub payer_id: PayerId,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Check or trace number
    pub reference_number: Option<String>,
    /// Remittance file this payment was imported from
    pub remittance_file: Option<String>,
    pub reconciliation_status: ReconciliationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates an unreconciled payment
    pub fn new(
        payer_id: PayerId,
        amount: Money,
        method: PaymentMethod,
        payment_date: NaiveDate,
    ) -> Result<Self, PaymentError> {
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new_v7(),
            payer_id,
            payment_date,
            amount,
            method,
            reference_number: None,
            remittance_file: None,
            reconciliation_status: ReconciliationStatus::Unreconciled,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the check or trace number
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    pub fn with_remittance_file(mut self, file: impl Into<String>) -> Self {
        self.remittance_file = Some(file.into());
        self
    }

    /// Amount not yet applied to any claim
    pub fn unallocated(&self, allocated: &Money) -> Result<Money, PaymentError> {
        Ok(self.amount.checked_sub(allocated)?)
    }

    /// Re-derives the reconciliation status from the allocated sum
    pub fn refresh_status(
        &mut self,
        allocated: &Money,
    ) -> Result<ReconciliationStatus, PaymentError> {
        if allocated.currency() != self.amount.currency() {
            return Err(PaymentError::InvalidAmount(format!(
                "allocations are in {}, payment is in {}",
                allocated.currency(),
                self.amount.currency()
            )));
        }
        if allocated > &self.amount && !allocated.settles(&self.amount) {
            return Err(PaymentError::Overallocated {
                allocated: *allocated,
                amount: self.amount,
            });
        }
        self.reconciliation_status = ReconciliationStatus::derive(allocated, &self.amount);
        self.updated_at = Utc::now();
        Ok(self.reconciliation_status)
    }
}
