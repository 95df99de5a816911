//! Remittance advice
//!
//! The parsed form of a payer's remittance. Wire formats are decoded
//! elsewhere; the engine only sees this structure.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::PayerId;
use crate::allocation::PaymentAdjustment;
use crate::error::PaymentError;
use crate::payment::PaymentMethod;

/// One claim line of a remittance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceLine {
    /// Claim number as printed on the claim
    pub claim_ref: String,
    /// Amount paid against the claim; zero for a denial
    pub amount: Decimal,
    #[serde(default)]
    pub adjustments: Vec<PaymentAdjustment>,
}

impl RemittanceLine {
    /// Zero paid with at least one adjustment explaining why
    pub fn is_denial(&self) -> bool {
        self.amount.is_zero() && !self.adjustments.is_empty()
    }

    /// Reason text for a denial line, built from its adjustment keys
    pub fn denial_reason(&self) -> String {
        self.adjustments
            .iter()
            .map(PaymentAdjustment::key)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A payer's remittance advice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemittanceAdvice {
    pub payer_id: PayerId,
    /// Check or EFT trace number
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    pub lines: Vec<RemittanceLine>,
}

impl RemittanceAdvice {
    /// Sum of all paid line amounts
    pub fn total_paid(&self) -> Decimal {
        self.lines.iter().map(|l| l.amount).sum()
    }

    /// Structural checks applied before anything is looked up
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.lines.is_empty() {
            return Err(PaymentError::InvalidRemittance("remittance has no lines".to_string()));
        }
        for (index, line) in self.lines.iter().enumerate() {
            if line.claim_ref.trim().is_empty() {
                return Err(PaymentError::InvalidRemittance(format!(
                    "line {} has no claim reference",
                    index + 1
                )));
            }
            if line.amount < Decimal::ZERO {
                return Err(PaymentError::InvalidRemittance(format!(
                    "line {} has negative amount {}",
                    index + 1,
                    line.amount
                )));
            }
        }
        Ok(())
    }
}
