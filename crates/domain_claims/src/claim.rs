//! Claim aggregate

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use core_kernel::{ClaimId, ClientId, DateRange, Money, PayerId, ServiceId};
use crate::error::ClaimError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Created from services, not yet sent
    Draft,
    /// Passed pre-submission scrubbing
    Validated,
    /// Sent to the payer
    Submitted,
    /// Payer confirmed receipt
    Acknowledged,
    /// In adjudication
    Pending,
    /// Fully paid through reconciliation
    Paid,
    /// Denied by the payer
    Denied,
    /// Denial under appeal
    Appealed,
    /// Withdrawn
    Void,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 9] = [
        ClaimStatus::Draft,
        ClaimStatus::Validated,
        ClaimStatus::Submitted,
        ClaimStatus::Acknowledged,
        ClaimStatus::Pending,
        ClaimStatus::Paid,
        ClaimStatus::Denied,
        ClaimStatus::Appealed,
        ClaimStatus::Void,
    ];

    /// Returns true if the lifecycle graph has an edge from `self` to `target`
    ///
    /// PAID edges exist here but are only taken by reconciliation.
    pub fn can_transition_to(self, target: ClaimStatus) -> bool {
        use ClaimStatus::*;
        match self {
            Draft => matches!(target, Validated | Submitted | Void),
            Validated => matches!(target, Submitted | Void),
            Submitted => matches!(target, Acknowledged | Paid | Void),
            Acknowledged => matches!(target, Pending | Paid | Void),
            Pending => matches!(target, Denied | Paid | Void),
            Denied => matches!(target, Appealed | Void),
            Appealed => matches!(target, Pending | Paid | Void),
            Paid | Void => false,
        }
    }

    /// Statuses in which a payment may be applied
    pub fn can_receive_payment(self) -> bool {
        self.can_transition_to(ClaimStatus::Paid)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Paid | ClaimStatus::Void)
    }

    /// The claim has left the practice
    pub fn is_submitted(self) -> bool {
        !matches!(self, ClaimStatus::Draft | ClaimStatus::Validated | ClaimStatus::Void)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Draft => "DRAFT",
            ClaimStatus::Validated => "VALIDATED",
            ClaimStatus::Submitted => "SUBMITTED",
            ClaimStatus::Acknowledged => "ACKNOWLEDGED",
            ClaimStatus::Pending => "PENDING",
            ClaimStatus::Paid => "PAID",
            ClaimStatus::Denied => "DENIED",
            ClaimStatus::Appealed => "APPEALED",
            ClaimStatus::Void => "VOID",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claim type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    Original,
    Adjustment,
    Replacement,
    Void,
}

impl ClaimType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimType::Original => "ORIGINAL",
            ClaimType::Adjustment => "ADJUSTMENT",
            ClaimType::Replacement => "REPLACEMENT",
            ClaimType::Void => "VOID",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ORIGINAL" => Some(ClaimType::Original),
            "ADJUSTMENT" => Some(ClaimType::Adjustment),
            "REPLACEMENT" => Some(ClaimType::Replacement),
            "VOID" => Some(ClaimType::Void),
            _ => None,
        }
    }
}

/// How a claim was sent to the payer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionMethod {
    Electronic,
    Clearinghouse,
    Portal,
    Paper,
}

impl SubmissionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionMethod::Electronic => "ELECTRONIC",
            SubmissionMethod::Clearinghouse => "CLEARINGHOUSE",
            SubmissionMethod::Portal => "PORTAL",
            SubmissionMethod::Paper => "PAPER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ELECTRONIC" => Some(SubmissionMethod::Electronic),
            "CLEARINGHOUSE" => Some(SubmissionMethod::Clearinghouse),
            "PORTAL" => Some(SubmissionMethod::Portal),
            "PAPER" => Some(SubmissionMethod::Paper),
            _ => None,
        }
    }
}

/// A status change requested from outside reconciliation
///
/// There is deliberately no variant for PAID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClaimStatusUpdate {
    Validate,
    Submit {
        method: SubmissionMethod,
        date: NaiveDate,
    },
    Acknowledge,
    MarkPending,
    Deny {
        reason: String,
        detail: Option<String>,
        adjudication_date: NaiveDate,
    },
    Appeal,
    Void {
        reason: String,
    },
}

impl ClaimStatusUpdate {
    /// Status the claim ends up in
    pub fn target(&self) -> ClaimStatus {
        match self {
            ClaimStatusUpdate::Validate => ClaimStatus::Validated,
            ClaimStatusUpdate::Submit { .. } => ClaimStatus::Submitted,
            ClaimStatusUpdate::Acknowledge => ClaimStatus::Acknowledged,
            ClaimStatusUpdate::MarkPending => ClaimStatus::Pending,
            ClaimStatusUpdate::Deny { .. } => ClaimStatus::Denied,
            ClaimStatusUpdate::Appeal => ClaimStatus::Appealed,
            ClaimStatusUpdate::Void { .. } => ClaimStatus::Void,
        }
    }
}

/// A bundle of services billed to one payer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_number: String,
    pub client_id: ClientId,
    pub payer_id: PayerId,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
    pub total_amount: Money,
    pub service_period: DateRange,
    pub submission_method: Option<SubmissionMethod>,
    pub submission_date: Option<NaiveDate>,
    pub adjudication_date: Option<NaiveDate>,
    pub denial_reason: Option<String>,
    pub denial_detail: Option<String>,
    /// Adjustment code → amount, derived from the claim's payments
    pub adjustment_codes: BTreeMap<String, Decimal>,
    pub original_claim_id: Option<ClaimId>,
    pub service_ids: Vec<ServiceId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Creates an ORIGINAL claim in DRAFT
    pub fn new_original(
        client_id: ClientId,
        payer_id: PayerId,
        total_amount: Money,
        service_period: DateRange,
        service_ids: Vec<ServiceId>,
    ) -> Result<Self, ClaimError> {
        if service_ids.is_empty() {
            return Err(ClaimError::NoServices);
        }
        Ok(Self::draft(
            client_id,
            payer_id,
            ClaimType::Original,
            total_amount,
            service_period,
            service_ids,
        ))
    }

    /// Creates an ADJUSTMENT, REPLACEMENT or VOID claim against a submitted original
    pub fn new_related(
        original: &Claim,
        claim_type: ClaimType,
        total_amount: Option<Money>,
        notes: Option<String>,
    ) -> Result<Self, ClaimError> {
        if claim_type == ClaimType::Original {
            return Err(ClaimError::InvalidRelatedClaim(
                "related claims cannot be ORIGINAL".to_string(),
            ));
        }
        if !original.status.is_submitted() {
            return Err(ClaimError::InvalidRelatedClaim(format!(
                "original claim {} is {} and was never submitted",
                original.claim_number, original.status
            )));
        }
        let total = total_amount.unwrap_or(original.total_amount);
        if total.is_negative() {
            return Err(ClaimError::InvalidRelatedClaim(format!("total {} is negative", total)));
        }
        let mut claim = Self::draft(
            original.client_id,
            original.payer_id,
            claim_type,
            total,
            original.service_period,
            original.service_ids.clone(),
        );
        claim.original_claim_id = Some(original.id);
        claim.notes = notes;
        Ok(claim)
    }

    fn draft(
        client_id: ClientId,
        payer_id: PayerId,
        claim_type: ClaimType,
        total_amount: Money,
        service_period: DateRange,
        service_ids: Vec<ServiceId>,
    ) -> Self {
        let now = Utc::now();
        let id = ClaimId::new_v7();
        Self {
            id,
            claim_number: generate_claim_number(&id, now),
            client_id,
            payer_id,
            claim_type,
            status: ClaimStatus::Draft,
            total_amount,
            service_period,
            submission_method: None,
            submission_date: None,
            adjudication_date: None,
            denial_reason: None,
            denial_detail: None,
            adjustment_codes: BTreeMap::new(),
            original_claim_id: None,
            service_ids,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status update, returning the previous status
    ///
    /// Nothing changes on error.
    pub fn apply_update(&mut self, update: &ClaimStatusUpdate) -> Result<ClaimStatus, ClaimError> {
        let from = self.status;
        let to = update.target();
        if !from.can_transition_to(to) {
            return Err(ClaimError::InvalidStatusTransition { from, to });
        }
        match update {
            ClaimStatusUpdate::Submit { method, date } => {
                self.submission_method = Some(*method);
                self.submission_date = Some(*date);
            }
            ClaimStatusUpdate::Deny { reason, detail, adjudication_date } => {
                self.denial_reason = Some(reason.clone());
                self.denial_detail = detail.clone();
                self.adjudication_date = Some(*adjudication_date);
            }
            ClaimStatusUpdate::Validate
            | ClaimStatusUpdate::Acknowledge
            | ClaimStatusUpdate::MarkPending
            | ClaimStatusUpdate::Appeal
            | ClaimStatusUpdate::Void { .. } => {}
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Moves the claim to PAID; reserved for reconciliation
    pub fn mark_paid(&mut self, adjudication_date: NaiveDate) -> Result<ClaimStatus, ClaimError> {
        let from = self.status;
        if !from.can_receive_payment() {
            return Err(ClaimError::NotPayable(from));
        }
        self.status = ClaimStatus::Paid;
        self.adjudication_date = Some(adjudication_date);
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Reverts a PAID claim to the status recorded before payment
    pub fn revert_payment(&mut self, previous: ClaimStatus) -> Result<(), ClaimError> {
        if self.status != ClaimStatus::Paid {
            return Err(ClaimError::NotPaid(self.status));
        }
        if !previous.can_receive_payment() {
            return Err(ClaimError::NotPayable(previous));
        }
        self.status = previous;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Replaces the derived adjustment-code map
    pub fn set_adjustment_codes(&mut self, codes: BTreeMap<String, Decimal>) {
        self.adjustment_codes = codes;
        self.updated_at = Utc::now();
    }
}

fn generate_claim_number(id: &ClaimId, now: DateTime<Utc>) -> String {
    let tail = id.as_uuid().simple().to_string();
    format!(
        "CLM-{}-{}",
        now.format("%Y%m%d"),
        tail[tail.len() - 10..].to_uppercase()
    )
}
