//! Claim payments and their adjustment lines

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use core_kernel::{ClaimId, ClaimPaymentId, Currency, Money, MoneyError, PaymentId};

/// Claim adjustment group code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdjustmentGroup {
    /// Contractual obligation
    #[serde(rename = "CO")]
    ContractualObligation,
    /// Patient responsibility
    #[serde(rename = "PR")]
    PatientResponsibility,
    /// Other adjustment
    #[serde(rename = "OA")]
    OtherAdjustment,
    /// Payer-initiated reduction
    #[serde(rename = "PI")]
    PayerInitiated,
    /// Correction or reversal
    #[serde(rename = "CR")]
    Correction,
}

impl AdjustmentGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentGroup::ContractualObligation => "CO",
            AdjustmentGroup::PatientResponsibility => "PR",
            AdjustmentGroup::OtherAdjustment => "OA",
            AdjustmentGroup::PayerInitiated => "PI",
            AdjustmentGroup::Correction => "CR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CO" => Some(AdjustmentGroup::ContractualObligation),
            "PR" => Some(AdjustmentGroup::PatientResponsibility),
            "OA" => Some(AdjustmentGroup::OtherAdjustment),
            "PI" => Some(AdjustmentGroup::PayerInitiated),
            "CR" => Some(AdjustmentGroup::Correction),
            _ => None,
        }
    }
}

impl fmt::Display for AdjustmentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One adjustment line on a claim payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAdjustment {
    pub group: AdjustmentGroup,
    /// Reason code within the group (e.g. "45")
    pub code: String,
    pub amount: Decimal,
    pub description: Option<String>,
}

impl PaymentAdjustment {
    pub fn new(group: AdjustmentGroup, code: impl Into<String>, amount: Decimal) -> Self {
        Self {
            group,
            code: code.into(),
            amount,
            description: None,
        }
    }

    /// Key used in a claim's adjustment-code map, e.g. "CO-45"
    pub fn key(&self) -> String {
        format!("{}-{}", self.group, self.code)
    }
}

/// The part of a payment applied to one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimPayment {
    pub id: ClaimPaymentId,
    pub payment_id: PaymentId,
    pub claim_id: ClaimId,
    pub paid_amount: Money,
    /// Adjustment lines in remittance order
    pub adjustments: Vec<PaymentAdjustment>,
    pub created_at: DateTime<Utc>,
}

impl ClaimPayment {
    pub fn new(
        payment_id: PaymentId,
        claim_id: ClaimId,
        paid_amount: Money,
        adjustments: Vec<PaymentAdjustment>,
    ) -> Self {
        Self {
            id: ClaimPaymentId::new_v7(),
            payment_id,
            claim_id,
            paid_amount,
            adjustments,
            created_at: Utc::now(),
        }
    }
}

/// Sum of `paid_amount` over `payments`
pub fn total_paid(currency: Currency, payments: &[ClaimPayment]) -> Result<Money, MoneyError> {
    Money::sum(currency, payments.iter().map(|p| &p.paid_amount))
}

/// The single derivation of a claim's adjustment-code map
pub fn derive_adjustment_codes(payments: &[ClaimPayment]) -> BTreeMap<String, Decimal> {
    let mut codes = BTreeMap::new();
    for adjustment in payments.iter().flat_map(|p| p.adjustments.iter()) {
        *codes.entry(adjustment.key()).or_insert(Decimal::ZERO) += adjustment.amount;
    }
    codes
}
