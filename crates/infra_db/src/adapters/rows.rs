//! Database rows and their conversion to domain types
//!
//! Enumerations are stored as their domain spellings (`as_str`) and parsed
//! back on load; an unknown spelling is `DatabaseError::InvalidData`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use core_kernel::{
    AuthorizationId, ClaimId, ClaimPaymentId, ClientId, Currency, DateRange, Money, PayerId,
    PaymentId, ProgramId, ServiceId, ServiceTypeId, StatusHistoryId,
};
use domain_billing::{
    Authorization, AuthorizationStatus, BillingStatus, DocumentationStatus, Service,
    ServiceCategory, ServiceDocument, ServiceType,
};
use domain_claims::{
    Claim, ClaimStatus, ClaimStatusHistoryEntry, ClaimType, HistoryEntryKind, SubmissionMethod,
};
use domain_payment::{ClaimPayment, Payment, PaymentAdjustment, PaymentMethod, ReconciliationStatus};

use crate::error::DatabaseError;

fn parse<T>(
    column: &str,
    value: &str,
    parser: impl Fn(&str) -> Option<T>,
) -> Result<T, DatabaseError> {
    parser(value).ok_or_else(|| DatabaseError::invalid(column, value))
}

fn currency(value: &str) -> Result<Currency, DatabaseError> {
    Currency::from_code(value.trim()).map_err(|_| DatabaseError::invalid("currency", value))
}

fn date_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange, DatabaseError> {
    DateRange::new(start, end).map_err(|e| DatabaseError::InvalidData(e.to_string()))
}

// ============================================================================
// Reference data
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ServiceTypeRow {
    pub service_type_id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
}

impl TryFrom<ServiceTypeRow> for ServiceType {
    type Error = DatabaseError;

    fn try_from(row: ServiceTypeRow) -> Result<Self, Self::Error> {
        Ok(ServiceType {
            id: ServiceTypeId::from_uuid(row.service_type_id),
            code: row.code,
            name: row.name,
            category: parse("category", &row.category, ServiceCategory::parse)?,
        })
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub service_id: Uuid,
    pub client_id: Uuid,
    pub service_type_id: Uuid,
    pub payer_id: Option<Uuid>,
    pub service_date: NaiveDate,
    pub units: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub documentation_status: String,
    pub billing_status: String,
    pub authorization_id: Option<Uuid>,
    pub claim_id: Option<Uuid>,
    pub reserved_units: Decimal,
    pub documents: Json<Vec<ServiceDocument>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for Service {
    type Error = DatabaseError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        let currency = currency(&row.currency)?;
        Ok(Service {
            id: ServiceId::from_uuid(row.service_id),
            client_id: ClientId::from_uuid(row.client_id),
            service_type_id: ServiceTypeId::from_uuid(row.service_type_id),
            payer_id: row.payer_id.map(PayerId::from_uuid),
            service_date: row.service_date,
            units: row.units,
            rate: Money::new(row.rate, currency),
            amount: Money::new(row.amount, currency),
            documentation_status: parse(
                "documentation_status",
                &row.documentation_status,
                DocumentationStatus::parse,
            )?,
            billing_status: parse("billing_status", &row.billing_status, BillingStatus::parse)?,
            authorization_id: row.authorization_id.map(AuthorizationId::from_uuid),
            claim_id: row.claim_id.map(ClaimId::from_uuid),
            reserved_units: row.reserved_units,
            documents: row.documents.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Authorizations
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationRow {
    pub authorization_id: Uuid,
    pub client_id: Uuid,
    pub program_id: Uuid,
    pub service_type_id: Uuid,
    pub authorized_units: Decimal,
    pub used_units: Decimal,
    pub valid_from: NaiveDate,
    pub valid_to: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AuthorizationRow> for Authorization {
    type Error = DatabaseError;

    fn try_from(row: AuthorizationRow) -> Result<Self, Self::Error> {
        Ok(Authorization {
            id: AuthorizationId::from_uuid(row.authorization_id),
            client_id: ClientId::from_uuid(row.client_id),
            program_id: ProgramId::from_uuid(row.program_id),
            service_type_id: ServiceTypeId::from_uuid(row.service_type_id),
            authorized_units: row.authorized_units,
            used_units: row.used_units,
            validity: date_range(row.valid_from, row.valid_to)?,
            status: parse("status", &row.status, AuthorizationStatus::parse)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Claims
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ClaimRow {
    pub claim_id: Uuid,
    pub claim_number: String,
    pub client_id: Uuid,
    pub payer_id: Uuid,
    pub claim_type: String,
    pub status: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub submission_method: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub adjudication_date: Option<NaiveDate>,
    pub denial_reason: Option<String>,
    pub denial_detail: Option<String>,
    pub adjustment_codes: Json<BTreeMap<String, Decimal>>,
    pub original_claim_id: Option<Uuid>,
    pub service_ids: Vec<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = DatabaseError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        let submission_method = match row.submission_method.as_deref() {
            Some(method) => Some(parse("submission_method", method, SubmissionMethod::parse)?),
            None => None,
        };
        Ok(Claim {
            id: ClaimId::from_uuid(row.claim_id),
            claim_number: row.claim_number,
            client_id: ClientId::from_uuid(row.client_id),
            payer_id: PayerId::from_uuid(row.payer_id),
            claim_type: parse("claim_type", &row.claim_type, ClaimType::parse)?,
            status: parse("status", &row.status, ClaimStatus::parse)?,
            total_amount: Money::new(row.total_amount, currency(&row.currency)?),
            service_period: date_range(row.period_start, row.period_end)?,
            submission_method,
            submission_date: row.submission_date,
            adjudication_date: row.adjudication_date,
            denial_reason: row.denial_reason,
            denial_detail: row.denial_detail,
            adjustment_codes: row.adjustment_codes.0,
            original_claim_id: row.original_claim_id.map(ClaimId::from_uuid),
            service_ids: row.service_ids.into_iter().map(ServiceId::from_uuid).collect(),
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub history_id: Uuid,
    pub claim_id: Uuid,
    pub status: String,
    pub previous_status: Option<String>,
    pub kind: String,
    pub actor: String,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for ClaimStatusHistoryEntry {
    type Error = DatabaseError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let previous_status = match row.previous_status.as_deref() {
            Some(status) => Some(parse("previous_status", status, ClaimStatus::parse)?),
            None => None,
        };
        Ok(ClaimStatusHistoryEntry {
            id: StatusHistoryId::from_uuid(row.history_id),
            claim_id: ClaimId::from_uuid(row.claim_id),
            status: parse("status", &row.status, ClaimStatus::parse)?,
            previous_status,
            kind: parse("kind", &row.kind, HistoryEntryKind::parse)?,
            actor: row.actor,
            notes: row.notes,
            changed_at: row.changed_at,
        })
    }
}

// ============================================================================
// Payments
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub payment_id: Uuid,
    pub payer_id: Uuid,
    pub payment_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub reference_number: Option<String>,
    pub remittance_file: Option<String>,
    pub reconciliation_status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.payment_id),
            payer_id: PayerId::from_uuid(row.payer_id),
            payment_date: row.payment_date,
            amount: Money::new(row.amount, currency(&row.currency)?),
            method: parse("method", &row.method, PaymentMethod::parse)?,
            reference_number: row.reference_number,
            remittance_file: row.remittance_file,
            reconciliation_status: parse(
                "reconciliation_status",
                &row.reconciliation_status,
                ReconciliationStatus::parse,
            )?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ClaimPaymentRow {
    pub claim_payment_id: Uuid,
    pub payment_id: Uuid,
    pub claim_id: Uuid,
    pub paid_amount: Decimal,
    pub currency: String,
    pub adjustments: Json<Vec<PaymentAdjustment>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ClaimPaymentRow> for ClaimPayment {
    type Error = DatabaseError;

    fn try_from(row: ClaimPaymentRow) -> Result<Self, Self::Error> {
        Ok(ClaimPayment {
            id: ClaimPaymentId::from_uuid(row.claim_payment_id),
            payment_id: PaymentId::from_uuid(row.payment_id),
            claim_id: ClaimId::from_uuid(row.claim_id),
            paid_amount: Money::new(row.paid_amount, currency(&row.currency)?),
            adjustments: row.adjustments.0,
            created_at: row.created_at,
        })
    }
}

/// Converts every row, failing on the first bad one
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}
