//! Services - billable units of care
//!
//! A service moves through the billing-status graph below. The graph is an
//! exhaustive match so adding a status without deciding its edges fails to
//! compile.
//!
//! ```text
//! UNBILLED ──► READY_FOR_BILLING ──► IN_CLAIM ──► BILLED ──► PAID
//!    ▲              ▲   │               │  │         │
//!    └──────────────┼───┘◄──────────────┘  │         ▼
//!                   └──────────────────────┼───── DENIED
//!                                          ▼
//!                        (any) ──────────► VOID
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{
    AuthorizationId, ClaimId, ClientId, DocumentId, Money, PayerId, ServiceId, ServiceTypeId,
};
use crate::error::BillingError;

/// Position of a service in the billing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingStatus {
    Unbilled,
    ReadyForBilling,
    InClaim,
    Billed,
    Paid,
    Denied,
    Void,
}

impl BillingStatus {
    /// All statuses, in pipeline order
    pub const ALL: [BillingStatus; 7] = [
        BillingStatus::Unbilled,
        BillingStatus::ReadyForBilling,
        BillingStatus::InClaim,
        BillingStatus::Billed,
        BillingStatus::Paid,
        BillingStatus::Denied,
        BillingStatus::Void,
    ];

    /// Returns true if the graph has an edge from `self` to `target`
    pub fn can_transition_to(self, target: BillingStatus) -> bool {
        use BillingStatus::*;
        match self {
            Unbilled => matches!(target, ReadyForBilling | Void),
            ReadyForBilling => matches!(target, Unbilled | InClaim | Void),
            InClaim => matches!(target, Billed | ReadyForBilling | Unbilled | Void),
            Billed => matches!(target, Paid | Denied | Void),
            Denied => matches!(target, ReadyForBilling | Void),
            Paid => matches!(target, Void),
            Void => false,
        }
    }

    /// Units, rate and documents can no longer change
    pub fn is_frozen(self) -> bool {
        use BillingStatus::*;
        match self {
            Unbilled | ReadyForBilling => false,
            InClaim | Billed | Paid | Denied | Void => true,
        }
    }

    /// Returns true for VOID
    pub fn is_terminal(self) -> bool {
        matches!(self, BillingStatus::Void)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BillingStatus::Unbilled => "UNBILLED",
            BillingStatus::ReadyForBilling => "READY_FOR_BILLING",
            BillingStatus::InClaim => "IN_CLAIM",
            BillingStatus::Billed => "BILLED",
            BillingStatus::Paid => "PAID",
            BillingStatus::Denied => "DENIED",
            BillingStatus::Void => "VOID",
        }
    }

    /// Parses the stored representation
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a service carries every document its type requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentationStatus {
    Incomplete,
    Complete,
}

impl DocumentationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentationStatus::Incomplete => "INCOMPLETE",
            DocumentationStatus::Complete => "COMPLETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INCOMPLETE" => Some(DocumentationStatus::Incomplete),
            "COMPLETE" => Some(DocumentationStatus::Complete),
            _ => None,
        }
    }
}

/// Kind of clinical document attached to a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    ProgressNote,
    Assessment,
    TreatmentPlan,
    Consent,
    Other,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::ProgressNote => "PROGRESS_NOTE",
            DocumentType::Assessment => "ASSESSMENT",
            DocumentType::TreatmentPlan => "TREATMENT_PLAN",
            DocumentType::Consent => "CONSENT",
            DocumentType::Other => "OTHER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PROGRESS_NOTE" => Some(DocumentType::ProgressNote),
            "ASSESSMENT" => Some(DocumentType::Assessment),
            "TREATMENT_PLAN" => Some(DocumentType::TreatmentPlan),
            "CONSENT" => Some(DocumentType::Consent),
            "OTHER" => Some(DocumentType::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service category, which decides the required document set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCategory {
    General,
    Therapy,
    Assessment,
    CaseManagement,
}

impl ServiceCategory {
    /// Documents that must be present and well-formed before billing
    pub fn required_documents(self) -> &'static [DocumentType] {
        match self {
            ServiceCategory::General | ServiceCategory::CaseManagement => {
                &[DocumentType::ProgressNote]
            }
            ServiceCategory::Therapy => &[DocumentType::ProgressNote, DocumentType::Assessment],
            ServiceCategory::Assessment => &[
                DocumentType::ProgressNote,
                DocumentType::Assessment,
                DocumentType::TreatmentPlan,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceCategory::General => "GENERAL",
            ServiceCategory::Therapy => "THERAPY",
            ServiceCategory::Assessment => "ASSESSMENT",
            ServiceCategory::CaseManagement => "CASE_MANAGEMENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GENERAL" => Some(ServiceCategory::General),
            "THERAPY" => Some(ServiceCategory::Therapy),
            "ASSESSMENT" => Some(ServiceCategory::Assessment),
            "CASE_MANAGEMENT" => Some(ServiceCategory::CaseManagement),
            _ => None,
        }
    }
}

/// Reference data describing a kind of service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: ServiceTypeId,
    /// Billing code (e.g. a procedure code)
    pub code: String,
    pub name: String,
    pub category: ServiceCategory,
}

impl ServiceType {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: ServiceCategory,
    ) -> Self {
        Self {
            id: ServiceTypeId::new_v7(),
            code: code.into(),
            name: name.into(),
            category,
        }
    }
}

/// A signed clinical document attached to a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDocument {
    pub id: DocumentId,
    pub document_type: DocumentType,
    pub content: String,
    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl ServiceDocument {
    /// Creates a signed document
    pub fn signed(
        document_type: DocumentType,
        content: impl Into<String>,
        signed_by: impl Into<String>,
        signed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DocumentId::new_v7(),
            document_type,
            content: content.into(),
            signed_by: Some(signed_by.into()),
            signed_at: Some(signed_at),
        }
    }

    /// Explains why the document is unusable, or `None` if it is well-formed
    pub fn defect(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.content.trim().is_empty() {
            return Some("content is blank");
        }
        if self.signed_by.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Some("signer is missing");
        }
        match self.signed_at {
            None => Some("signature timestamp is missing"),
            Some(at) if at > now => Some("signature timestamp is in the future"),
            Some(_) => None,
        }
    }

    pub fn is_well_formed(&self, now: DateTime<Utc>) -> bool {
        self.defect(now).is_none()
    }
}

/// A problem with a service's documentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentGap {
    Missing(DocumentType),
    Malformed {
        document_type: DocumentType,
        document_id: DocumentId,
        reason: &'static str,
    },
}

impl fmt::Display for DocumentGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentGap::Missing(t) => write!(f, "required document {} is missing", t),
            DocumentGap::Malformed { document_type, document_id, reason } => {
                write!(f, "{} document {} is not usable: {}", document_type, document_id, reason)
            }
        }
    }
}

/// Lists every gap between the attached documents and the category's requirements
pub fn documentation_gaps(
    category: ServiceCategory,
    documents: &[ServiceDocument],
    now: DateTime<Utc>,
) -> Vec<DocumentGap> {
    let mut gaps = Vec::new();
    for required in category.required_documents() {
        let mut present = false;
        for doc in documents.iter().filter(|d| d.document_type == *required) {
            present = true;
            if let Some(reason) = doc.defect(now) {
                gaps.push(DocumentGap::Malformed {
                    document_type: *required,
                    document_id: doc.id,
                    reason,
                });
            }
        }
        if !present {
            gaps.push(DocumentGap::Missing(*required));
        }
    }
    gaps
}

/// The only function allowed to decide a service's documentation status
pub fn derive_documentation_status(
    category: ServiceCategory,
    documents: &[ServiceDocument],
    now: DateTime<Utc>,
) -> DocumentationStatus {
    if documentation_gaps(category, documents, now).is_empty() {
        DocumentationStatus::Complete
    } else {
        DocumentationStatus::Incomplete
    }
}

/// A billable unit of care delivered to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub client_id: ClientId,
    pub service_type_id: ServiceTypeId,
    /// Payer expected to cover the service; drives the timely-filing limit
    pub payer_id: Option<PayerId>,
    pub service_date: NaiveDate,
    pub units: Decimal,
    pub rate: Money,
    /// `units * rate`
    pub amount: Money,
    pub documentation_status: DocumentationStatus,
    pub billing_status: BillingStatus,
    pub authorization_id: Option<AuthorizationId>,
    pub claim_id: Option<ClaimId>,
    /// Units currently held against the authorization for this service
    pub reserved_units: Decimal,
    pub documents: Vec<ServiceDocument>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// Creates an UNBILLED service
    ///
    /// Fails when `units * rate` does not fit the decimal range.
    pub fn new(
        client_id: ClientId,
        service_type: &ServiceType,
        service_date: NaiveDate,
        units: Decimal,
        rate: Money,
    ) -> Result<Self, BillingError> {
        let now = Utc::now();
        Ok(Self {
            id: ServiceId::new_v7(),
            client_id,
            service_type_id: service_type.id,
            payer_id: None,
            service_date,
            units,
            rate,
            amount: rate.checked_mul(units)?,
            documentation_status: DocumentationStatus::Incomplete,
            billing_status: BillingStatus::Unbilled,
            authorization_id: None,
            claim_id: None,
            reserved_units: Decimal::ZERO,
            documents: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves along the billing-status graph
    ///
    /// Returns the previous status. Entering UNBILLED or READY_FOR_BILLING
    /// drops any claim back-reference.
    pub fn transition_to(&mut self, target: BillingStatus) -> Result<BillingStatus, BillingError> {
        let from = self.billing_status;
        if !from.can_transition_to(target) {
            return Err(BillingError::InvalidTransition { from, to: target });
        }
        if matches!(target, BillingStatus::Unbilled | BillingStatus::ReadyForBilling) {
            self.claim_id = None;
        }
        self.billing_status = target;
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Places the service on a claim (READY_FOR_BILLING → IN_CLAIM)
    pub fn assign_to_claim(&mut self, claim_id: ClaimId) -> Result<(), BillingError> {
        let amount = self.rate.checked_mul(self.units)?;
        self.transition_to(BillingStatus::InClaim)?;
        self.amount = amount;
        self.claim_id = Some(claim_id);
        Ok(())
    }

    /// Replaces units and rate, returning the unit delta (new - old)
    pub fn set_units_and_rate(
        &mut self,
        units: Decimal,
        rate: Money,
    ) -> Result<Decimal, BillingError> {
        self.ensure_editable()?;
        if units <= Decimal::ZERO {
            return Err(BillingError::InvalidUnits(units));
        }
        if !rate.is_positive() {
            return Err(BillingError::InvalidAmount(format!("rate must be positive, got {}", rate)));
        }
        let amount = rate.checked_mul(units)?;
        let delta = units - self.units;
        self.units = units;
        self.rate = rate;
        self.amount = amount;
        self.updated_at = Utc::now();
        Ok(delta)
    }

    /// Attaches a document and re-derives the documentation status
    pub fn attach_document(
        &mut self,
        document: ServiceDocument,
        category: ServiceCategory,
        now: DateTime<Utc>,
    ) -> Result<DocumentationStatus, BillingError> {
        self.ensure_editable()?;
        self.documents.push(document);
        self.refresh_documentation(category, now);
        self.updated_at = Utc::now();
        Ok(self.documentation_status)
    }

    /// Recomputes the stored documentation status
    pub fn refresh_documentation(&mut self, category: ServiceCategory, now: DateTime<Utc>) {
        self.documentation_status = derive_documentation_status(category, &self.documents, now);
    }

    /// `amount == units * rate`
    pub fn amount_is_consistent(&self) -> bool {
        self.rate
            .checked_mul(self.units)
            .map(|expected| self.amount.settles(&expected))
            .unwrap_or(false)
    }

    fn ensure_editable(&self) -> Result<(), BillingError> {
        if self.billing_status.is_frozen() {
            return Err(BillingError::ServiceLocked { status: self.billing_status });
        }
        Ok(())
    }
}
