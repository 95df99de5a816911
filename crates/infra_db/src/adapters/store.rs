//! PostgreSQL Billing Store
//!
//! Implements `BillingStore` on a SQLx connection pool. Every engine
//! transaction maps onto one database transaction; `load_*` methods take
//! row locks with `SELECT ... FOR UPDATE` so concurrent reservations and
//! reconciliations against the same rows serialize.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new(url)).await?;
//! let store = Arc::new(PostgresBillingStore::new(pool));
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, AuthorizationId, ClaimId, DomainPort, HealthCheckResult, HealthCheckable,
    PayerId, PaymentId, PortError, ServiceId, ServiceTypeId,
};
use domain_billing::{Authorization, BillingStatus, Service, ServiceType};
use domain_claims::{Claim, ClaimStatus, ClaimStatusHistoryEntry};
use domain_payment::{ClaimPayment, Payment};
use domain_revenue::{BillingStore, StoreTransaction};

use crate::adapters::rows::{
    convert_all, AuthorizationRow, ClaimPaymentRow, ClaimRow, HistoryRow, PaymentRow, ServiceRow,
    ServiceTypeRow,
};
use crate::error::DatabaseError;

const SERVICE_COLUMNS: &str = "service_id, client_id, service_type_id, payer_id, service_date, \
     units, rate, amount, currency, documentation_status, billing_status, authorization_id, \
     claim_id, reserved_units, documents, notes, created_at, updated_at";

const AUTHORIZATION_COLUMNS: &str = "authorization_id, client_id, program_id, service_type_id, \
     authorized_units, used_units, valid_from, valid_to, status, created_at, updated_at";

const CLAIM_COLUMNS: &str = "claim_id, claim_number, client_id, payer_id, claim_type, status, \
     total_amount, currency, period_start, period_end, submission_method, submission_date, \
     adjudication_date, denial_reason, denial_detail, adjustment_codes, original_claim_id, \
     service_ids, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "payment_id, payer_id, payment_date, amount, currency, method, \
     reference_number, remittance_file, reconciliation_status, notes, created_at, updated_at";

const CLAIM_PAYMENT_COLUMNS: &str =
    "claim_payment_id, payment_id, claim_id, paid_amount, currency, adjustments, created_at";

fn db(error: sqlx::Error) -> PortError {
    DatabaseError::from(error).into()
}

fn decoded<T>(result: Result<T, DatabaseError>) -> Result<T, PortError> {
    result.map_err(PortError::from)
}

/// Fails with `NotFound` when an UPDATE touched no row
fn touched(
    rows_affected: u64,
    entity: &'static str,
    id: impl std::fmt::Display,
) -> Result<(), PortError> {
    if rows_affected == 0 {
        return Err(DatabaseError::not_found(entity, id).into());
    }
    Ok(())
}

/// PostgreSQL-backed implementation of `BillingStore`
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    pool: PgPool,
}

impl PostgresBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    /// Performs a `SELECT 1` round trip on the pool
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: "postgres-billing-store".to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: "postgres-billing-store".to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, PortError> {
        let tx = self.pool.begin().await.map_err(db)?;
        debug!("transaction opened");
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

/// One open database transaction
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    // ========================================================================
    // Reference data
    // ========================================================================

    async fn load_service_type(
        &mut self,
        id: ServiceTypeId,
    ) -> Result<Option<ServiceType>, PortError> {
        let row = sqlx::query_as::<_, ServiceTypeRow>(
            "SELECT service_type_id, code, name, category FROM service_types \
             WHERE service_type_id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db)?;
        decoded(row.map(ServiceType::try_from).transpose())
    }

    async fn insert_service_type(&mut self, service_type: &ServiceType) -> Result<(), PortError> {
        sqlx::query(
            "INSERT INTO service_types (service_type_id, code, name, category) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*service_type.id.as_uuid())
        .bind(&service_type.code)
        .bind(&service_type.name)
        .bind(service_type.category.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    // ========================================================================
    // Services
    // ========================================================================

    async fn load_service(&mut self, id: ServiceId) -> Result<Option<Service>, PortError> {
        let sql =
            format!("SELECT {} FROM services WHERE service_id = $1 FOR UPDATE", SERVICE_COLUMNS);
        let row = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(row.map(Service::try_from).transpose())
    }

    async fn services_for_claim(&mut self, claim_id: ClaimId) -> Result<Vec<Service>, PortError> {
        let sql = format!(
            "SELECT {} FROM services WHERE claim_id = $1 \
             ORDER BY service_date, service_id FOR UPDATE",
            SERVICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, ServiceRow>(&sql)
            .bind(*claim_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(convert_all(rows))
    }

    async fn count_duplicate_services(&mut self, service: &Service) -> Result<usize, PortError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM services
            WHERE service_id <> $1
              AND client_id = $2
              AND service_date = $3
              AND service_type_id = $4
              AND billing_status <> $5
            "#,
        )
        .bind(*service.id.as_uuid())
        .bind(*service.client_id.as_uuid())
        .bind(service.service_date)
        .bind(*service.service_type_id.as_uuid())
        .bind(BillingStatus::Void.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(count.max(0) as usize)
    }

    async fn insert_service(&mut self, service: &Service) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO services (
                service_id, client_id, service_type_id, payer_id, service_date, units, rate,
                amount, currency, documentation_status, billing_status, authorization_id, claim_id,
                reserved_units, documents, notes, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            "#,
        )
        .bind(*service.id.as_uuid())
        .bind(*service.client_id.as_uuid())
        .bind(*service.service_type_id.as_uuid())
        .bind(service.payer_id.map(Uuid::from))
        .bind(service.service_date)
        .bind(service.units)
        .bind(service.rate.amount())
        .bind(service.amount.amount())
        .bind(service.amount.currency().code())
        .bind(service.documentation_status.as_str())
        .bind(service.billing_status.as_str())
        .bind(service.authorization_id.map(Uuid::from))
        .bind(service.claim_id.map(Uuid::from))
        .bind(service.reserved_units)
        .bind(Json(&service.documents))
        .bind(&service.notes)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_service(&mut self, service: &Service) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE services SET
                payer_id = $2, service_date = $3, units = $4, rate = $5, amount = $6, currency = $7,
                documentation_status = $8, billing_status = $9, authorization_id = $10,
                claim_id = $11,
                reserved_units = $12, documents = $13, notes = $14, updated_at = $15
            WHERE service_id = $1
            "#,
        )
        .bind(*service.id.as_uuid())
        .bind(service.payer_id.map(Uuid::from))
        .bind(service.service_date)
        .bind(service.units)
        .bind(service.rate.amount())
        .bind(service.amount.amount())
        .bind(service.amount.currency().code())
        .bind(service.documentation_status.as_str())
        .bind(service.billing_status.as_str())
        .bind(service.authorization_id.map(Uuid::from))
        .bind(service.claim_id.map(Uuid::from))
        .bind(service.reserved_units)
        .bind(Json(&service.documents))
        .bind(&service.notes)
        .bind(service.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        touched(result.rows_affected(), "Service", service.id)
    }

    // ========================================================================
    // Authorizations
    // ========================================================================

    async fn load_authorization(
        &mut self,
        id: AuthorizationId,
    ) -> Result<Option<Authorization>, PortError> {
        let sql = format!(
            "SELECT {} FROM authorizations WHERE authorization_id = $1 FOR UPDATE",
            AUTHORIZATION_COLUMNS
        );
        let row = sqlx::query_as::<_, AuthorizationRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(row.map(Authorization::try_from).transpose())
    }

    async fn insert_authorization(
        &mut self,
        authorization: &Authorization,
    ) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO authorizations (
                authorization_id, client_id, program_id, service_type_id, authorized_units,
                used_units, valid_from, valid_to, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(*authorization.id.as_uuid())
        .bind(*authorization.client_id.as_uuid())
        .bind(*authorization.program_id.as_uuid())
        .bind(*authorization.service_type_id.as_uuid())
        .bind(authorization.authorized_units)
        .bind(authorization.used_units)
        .bind(authorization.validity.start)
        .bind(authorization.validity.end)
        .bind(authorization.status.as_str())
        .bind(authorization.created_at)
        .bind(authorization.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_authorization(
        &mut self,
        authorization: &Authorization,
    ) -> Result<(), PortError> {
        if authorization.used_units.is_sign_negative()
            || authorization.used_units > authorization.authorized_units
        {
            return Err(PortError::validation_field(
                format!(
                    "used units {} outside 0..={}",
                    authorization.used_units, authorization.authorized_units
                ),
                "used_units",
            ));
        }
        let result = sqlx::query(
            "UPDATE authorizations SET used_units = $2, status = $3, updated_at = $4 \
             WHERE authorization_id = $1",
        )
        .bind(*authorization.id.as_uuid())
        .bind(authorization.used_units)
        .bind(authorization.status.as_str())
        .bind(authorization.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        touched(result.rows_affected(), "Authorization", authorization.id)
    }

    // ========================================================================
    // Claims and history
    // ========================================================================

    async fn load_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        let sql = format!("SELECT {} FROM claims WHERE claim_id = $1 FOR UPDATE", CLAIM_COLUMNS);
        let row = sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(row.map(Claim::try_from).transpose())
    }

    async fn find_claim_by_number(
        &mut self,
        claim_number: &str,
    ) -> Result<Option<Claim>, PortError> {
        let sql =
            format!("SELECT {} FROM claims WHERE claim_number = $1 FOR UPDATE", CLAIM_COLUMNS);
        let row = sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(claim_number)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(row.map(Claim::try_from).transpose())
    }

    async fn claims_for_payer(
        &mut self,
        payer_id: PayerId,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, PortError> {
        let sql = format!(
            "SELECT {} FROM claims WHERE payer_id = $1 AND status = ANY($2) ORDER BY claim_number",
            CLAIM_COLUMNS
        );
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, ClaimRow>(&sql)
            .bind(*payer_id.as_uuid())
            .bind(&statuses)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(convert_all(rows))
    }

    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        let service_ids: Vec<Uuid> = claim.service_ids.iter().map(|id| *id.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO claims (
                claim_id, claim_number, client_id, payer_id, claim_type, status, total_amount,
                currency, period_start, period_end, submission_method, submission_date,
                adjudication_date, denial_reason, denial_detail, adjustment_codes,
                original_claim_id, service_ids, notes, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21
            )
            "#,
        )
        .bind(*claim.id.as_uuid())
        .bind(&claim.claim_number)
        .bind(*claim.client_id.as_uuid())
        .bind(*claim.payer_id.as_uuid())
        .bind(claim.claim_type.as_str())
        .bind(claim.status.as_str())
        .bind(claim.total_amount.amount())
        .bind(claim.total_amount.currency().code())
        .bind(claim.service_period.start)
        .bind(claim.service_period.end)
        .bind(claim.submission_method.map(|m| m.as_str()))
        .bind(claim.submission_date)
        .bind(claim.adjudication_date)
        .bind(&claim.denial_reason)
        .bind(&claim.denial_detail)
        .bind(Json(&claim.adjustment_codes))
        .bind(claim.original_claim_id.map(Uuid::from))
        .bind(&service_ids)
        .bind(&claim.notes)
        .bind(claim.created_at)
        .bind(claim.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE claims SET
                status = $2, total_amount = $3, submission_method = $4, submission_date = $5,
                adjudication_date = $6, denial_reason = $7, denial_detail = $8,
                adjustment_codes = $9,
                notes = $10, updated_at = $11
            WHERE claim_id = $1
            "#,
        )
        .bind(*claim.id.as_uuid())
        .bind(claim.status.as_str())
        .bind(claim.total_amount.amount())
        .bind(claim.submission_method.map(|m| m.as_str()))
        .bind(claim.submission_date)
        .bind(claim.adjudication_date)
        .bind(&claim.denial_reason)
        .bind(&claim.denial_detail)
        .bind(Json(&claim.adjustment_codes))
        .bind(&claim.notes)
        .bind(claim.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        touched(result.rows_affected(), "Claim", claim.id)
    }

    async fn append_history(&mut self, entry: &ClaimStatusHistoryEntry) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO claim_status_history (
                history_id, claim_id, status, previous_status, kind, actor, notes, changed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.claim_id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(entry.kind.as_str())
        .bind(&entry.actor)
        .bind(&entry.notes)
        .bind(entry.changed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn load_history(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimStatusHistoryEntry>, PortError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT history_id, claim_id, status, previous_status, kind, actor, notes, changed_at
            FROM claim_status_history
            WHERE claim_id = $1
            ORDER BY seq
            "#,
        )
        .bind(*claim_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db)?;
        decoded(convert_all(rows))
    }

    // ========================================================================
    // Payments
    // ========================================================================

    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        let sql =
            format!("SELECT {} FROM payments WHERE payment_id = $1 FOR UPDATE", PAYMENT_COLUMNS);
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(row.map(Payment::try_from).transpose())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, payer_id, payment_date, amount, currency, method, reference_number,
                remittance_file, reconciliation_status, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(*payment.id.as_uuid())
        .bind(*payment.payer_id.as_uuid())
        .bind(payment.payment_date)
        .bind(payment.amount.amount())
        .bind(payment.amount.currency().code())
        .bind(payment.method.as_str())
        .bind(&payment.reference_number)
        .bind(&payment.remittance_file)
        .bind(payment.reconciliation_status.as_str())
        .bind(&payment.notes)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                reference_number = $2, remittance_file = $3, reconciliation_status = $4,
                notes = $5, updated_at = $6
            WHERE payment_id = $1
            "#,
        )
        .bind(*payment.id.as_uuid())
        .bind(&payment.reference_number)
        .bind(&payment.remittance_file)
        .bind(payment.reconciliation_status.as_str())
        .bind(&payment.notes)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        touched(result.rows_affected(), "Payment", payment.id)
    }

    async fn insert_claim_payment(
        &mut self,
        claim_payment: &ClaimPayment,
    ) -> Result<(), PortError> {
        sqlx::query(
            r#"
            INSERT INTO claim_payments (
                claim_payment_id, payment_id, claim_id, paid_amount, currency, adjustments,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*claim_payment.id.as_uuid())
        .bind(*claim_payment.payment_id.as_uuid())
        .bind(*claim_payment.claim_id.as_uuid())
        .bind(claim_payment.paid_amount.amount())
        .bind(claim_payment.paid_amount.currency().code())
        .bind(Json(&claim_payment.adjustments))
        .bind(claim_payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<ClaimPayment>, PortError> {
        let sql = format!(
            "SELECT {} FROM claim_payments WHERE payment_id = $1 \
             ORDER BY created_at, claim_payment_id",
            CLAIM_PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClaimPaymentRow>(&sql)
            .bind(*payment_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(convert_all(rows))
    }

    async fn claim_payments_for_claim(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimPayment>, PortError> {
        let sql = format!(
            "SELECT {} FROM claim_payments WHERE claim_id = $1 \
             ORDER BY created_at, claim_payment_id",
            CLAIM_PAYMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClaimPaymentRow>(&sql)
            .bind(*claim_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;
        decoded(convert_all(rows))
    }

    async fn delete_claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<u64, PortError> {
        let result = sqlx::query("DELETE FROM claim_payments WHERE payment_id = $1")
            .bind(*payment_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Boundary
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(db)?;
        debug!("transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        self.tx.rollback().await.map_err(db)?;
        debug!("transaction rolled back");
        Ok(())
    }
}
