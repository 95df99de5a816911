//! Revenue Engine Ports
//!
//! The engine talks to four collaborators, each behind a trait so adapters
//! can be swapped:
//!
//! - **BillingStore**: transactional persistence for services, authorizations,
//!   claims, history and payments
//! - **DirectoryPort**: client and payer lookups
//! - **ObservabilityPort**: advisory signals (utilization thresholds, rejected
//!   transitions)
//! - **NotificationPort**: lifecycle events, delivered after commit
//!
//! # Adapters
//!
//! - **PostgreSQL**: `infra_db::PostgresBillingStore` and `PostgresDirectory`
//! - **In-memory**: `crate::adapters::memory`, used by tests and dry runs
//! - **Tracing**: `crate::adapters::logging`, the default observability and
//!   notification sinks
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let service = tx.load_service(service_id).await?;
//! // ...
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use core_kernel::{
    AuthorizationId, ClaimId, ClientId, DomainPort, HealthCheckable, PayerId, PaymentId, PortError,
    ServiceId, ServiceTypeId,
};
use domain_billing::{Authorization, Service, ServiceType};
use domain_claims::{Claim, ClaimStatus, ClaimStatusHistoryEntry};
use domain_payment::{ClaimPayment, Payment};

use crate::events::{LifecycleEvent, Signal};

/// Transactional persistence for the revenue cycle
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    /// Opens a transaction
    ///
    /// Dropping the returned transaction without committing rolls it back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, PortError>;
}

/// One open store transaction
///
/// `load_*` methods lock the rows they return until the transaction ends,
/// so a read-check-write sequence inside one transaction sees no concurrent
/// writer. Loads return `Ok(None)` for missing rows; updates of missing rows
/// fail with `PortError::NotFound`.
#[async_trait]
pub trait StoreTransaction: Send {
    // ========================================================================
    // Reference data
    // ========================================================================

    async fn load_service_type(
        &mut self,
        id: ServiceTypeId,
    ) -> Result<Option<ServiceType>, PortError>;

    async fn insert_service_type(&mut self, service_type: &ServiceType) -> Result<(), PortError>;

    // ========================================================================
    // Services
    // ========================================================================

    async fn load_service(&mut self, id: ServiceId) -> Result<Option<Service>, PortError>;

    /// Services whose claim back-reference is `claim_id`
    async fn services_for_claim(&mut self, claim_id: ClaimId) -> Result<Vec<Service>, PortError>;

    /// Counts other non-void services with the same client, date and type
    async fn count_duplicate_services(&mut self, service: &Service) -> Result<usize, PortError>;

    async fn insert_service(&mut self, service: &Service) -> Result<(), PortError>;

    async fn update_service(&mut self, service: &Service) -> Result<(), PortError>;

    // ========================================================================
    // Authorizations
    // ========================================================================

    async fn load_authorization(
        &mut self,
        id: AuthorizationId,
    ) -> Result<Option<Authorization>, PortError>;

    async fn insert_authorization(
        &mut self,
        authorization: &Authorization,
    ) -> Result<(), PortError>;

    /// Persists used units; must refuse values outside `0..=authorized`
    async fn update_authorization(
        &mut self,
        authorization: &Authorization,
    ) -> Result<(), PortError>;

    // ========================================================================
    // Claims and history
    // ========================================================================

    async fn load_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError>;

    async fn find_claim_by_number(
        &mut self,
        claim_number: &str,
    ) -> Result<Option<Claim>, PortError>;

    /// Claims of a payer in any of `statuses`, without locking
    async fn claims_for_payer(
        &mut self,
        payer_id: PayerId,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, PortError>;

    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError>;

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError>;

    /// Appends to the claim's history; history rows are never updated
    async fn append_history(&mut self, entry: &ClaimStatusHistoryEntry) -> Result<(), PortError>;

    /// History of a claim in append order
    async fn load_history(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimStatusHistoryEntry>, PortError>;

    // ========================================================================
    // Payments
    // ========================================================================

    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), PortError>;

    async fn insert_claim_payment(&mut self, claim_payment: &ClaimPayment) -> Result<(), PortError>;

    async fn claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<ClaimPayment>, PortError>;

    async fn claim_payments_for_claim(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimPayment>, PortError>;

    /// Deletes every claim payment of a payment, returning how many went
    async fn delete_claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<u64, PortError>;

    // ========================================================================
    // Boundary
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}

/// Whether a client or payer may be billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyStatus {
    Active,
    Inactive,
}

impl PartyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PartyStatus::Active => "ACTIVE",
            PartyStatus::Inactive => "INACTIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(PartyStatus::Active),
            "INACTIVE" => Some(PartyStatus::Inactive),
            _ => None,
        }
    }
}

/// A client or payer as the directory knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub name: String,
    pub status: PartyStatus,
}

impl DirectoryEntry {
    pub fn is_active(&self) -> bool {
        self.status == PartyStatus::Active
    }
}

/// Client and payer lookups
#[async_trait]
pub trait DirectoryPort: DomainPort {
    /// Returns the client or `PortError::NotFound`
    async fn get_client(&self, id: ClientId) -> Result<DirectoryEntry, PortError>;

    /// Returns the payer or `PortError::NotFound`
    async fn get_payer(&self, id: PayerId) -> Result<DirectoryEntry, PortError>;
}

/// Sink for advisory signals
///
/// Emission is synchronous and must never block or fail the caller.
pub trait ObservabilityPort: DomainPort {
    fn emit(&self, signal: Signal);
}

/// Sink for committed lifecycle events
#[async_trait]
pub trait NotificationPort: DomainPort {
    async fn notify(&self, event: &LifecycleEvent) -> Result<(), PortError>;
}
