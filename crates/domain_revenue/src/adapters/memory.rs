//! In-memory adapters
//!
//! `InMemoryStore` serializes transactions behind one async mutex: a
//! transaction owns the lock from `begin` until it commits or is dropped,
//! and works on a private copy of the state that replaces the shared state
//! only on commit. That gives the same guarantees as row locks, at the cost
//! of no concurrency at all.
//!
//! The store can also inject faults (transient `begin` failures, failing
//! commits, slow commits) so timeout and retry paths can be tested.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use core_kernel::{
    AdapterHealth, AuthorizationId, ClaimId, ClientId, DomainPort, HealthCheckResult,
    HealthCheckable, PayerId, PaymentId, PortError, ServiceId, ServiceTypeId,
};
use domain_billing::{Authorization, BillingStatus, Service, ServiceType};
use domain_claims::{Claim, ClaimStatus, ClaimStatusHistoryEntry};
use domain_payment::{ClaimPayment, Payment};

use crate::events::{LifecycleEvent, Signal};
use crate::ports::{
    BillingStore, DirectoryEntry, DirectoryPort, NotificationPort, ObservabilityPort, PartyStatus,
    StoreTransaction,
};

/// Everything the in-memory store holds
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub service_types: HashMap<ServiceTypeId, ServiceType>,
    pub services: HashMap<ServiceId, Service>,
    pub authorizations: HashMap<AuthorizationId, Authorization>,
    pub claims: HashMap<ClaimId, Claim>,
    /// All history rows in append order
    pub history: Vec<ClaimStatusHistoryEntry>,
    pub payments: HashMap<PaymentId, Payment>,
    /// All claim payments in insert order
    pub claim_payments: Vec<ClaimPayment>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_begins: AtomicUsize,
    fail_commit: AtomicBool,
    commit_latency_ms: AtomicU64,
}

/// Transactional in-memory `BillingStore`
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls to `begin` fail with a connection error
    pub fn fail_next_begins(&self, count: usize) {
        self.faults.failing_begins.store(count, Ordering::SeqCst);
    }

    /// Every commit fails while set
    pub fn set_fail_commit(&self, fail: bool) {
        self.faults.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Every commit sleeps this long before publishing its changes
    pub fn set_commit_latency(&self, latency: Duration) {
        self.faults
            .commit_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// A copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Edits the committed state directly, bypassing the engine
    pub async fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut MemoryState),
    {
        let mut state = self.state.lock().await;
        f(&mut state);
    }
}

impl DomainPort for InMemoryStore {}

#[async_trait]
impl HealthCheckable for InMemoryStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "memory-billing-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("In-memory store always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, PortError> {
        let failing = self
            .faults
            .failing_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(PortError::connection("injected connection failure"));
        }

        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<Faults>,
}

fn duplicate(entity: &str, id: impl std::fmt::Display) -> PortError {
    PortError::conflict(format!("{} {} already exists", entity, id))
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn load_service_type(
        &mut self,
        id: ServiceTypeId,
    ) -> Result<Option<ServiceType>, PortError> {
        Ok(self.working.service_types.get(&id).cloned())
    }

    async fn insert_service_type(&mut self, service_type: &ServiceType) -> Result<(), PortError> {
        if self.working.service_types.contains_key(&service_type.id) {
            return Err(duplicate("ServiceType", service_type.id));
        }
        self.working.service_types.insert(service_type.id, service_type.clone());
        Ok(())
    }

    async fn load_service(&mut self, id: ServiceId) -> Result<Option<Service>, PortError> {
        Ok(self.working.services.get(&id).cloned())
    }

    async fn services_for_claim(&mut self, claim_id: ClaimId) -> Result<Vec<Service>, PortError> {
        let mut services: Vec<Service> = self
            .working
            .services
            .values()
            .filter(|s| s.claim_id == Some(claim_id))
            .cloned()
            .collect();
        services.sort_by(|a, b| a.service_date.cmp(&b.service_date).then_with(|| a.id.cmp(&b.id)));
        Ok(services)
    }

    async fn count_duplicate_services(&mut self, service: &Service) -> Result<usize, PortError> {
        Ok(self
            .working
            .services
            .values()
            .filter(|s| {
                s.id != service.id
                    && s.client_id == service.client_id
                    && s.service_date == service.service_date
                    && s.service_type_id == service.service_type_id
                    && s.billing_status != BillingStatus::Void
            })
            .count())
    }

    async fn insert_service(&mut self, service: &Service) -> Result<(), PortError> {
        if self.working.services.contains_key(&service.id) {
            return Err(duplicate("Service", service.id));
        }
        self.working.services.insert(service.id, service.clone());
        Ok(())
    }

    async fn update_service(&mut self, service: &Service) -> Result<(), PortError> {
        match self.working.services.get_mut(&service.id) {
            Some(stored) => {
                *stored = service.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Service", service.id)),
        }
    }

    async fn load_authorization(
        &mut self,
        id: AuthorizationId,
    ) -> Result<Option<Authorization>, PortError> {
        Ok(self.working.authorizations.get(&id).cloned())
    }

    async fn insert_authorization(
        &mut self,
        authorization: &Authorization,
    ) -> Result<(), PortError> {
        if self.working.authorizations.contains_key(&authorization.id) {
            return Err(duplicate("Authorization", authorization.id));
        }
        self.working.authorizations.insert(authorization.id, authorization.clone());
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
        match self.working.authorizations.get_mut(&authorization.id) {
            Some(stored) => {
                *stored = authorization.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Authorization", authorization.id)),
        }
    }

    async fn load_claim(&mut self, id: ClaimId) -> Result<Option<Claim>, PortError> {
        Ok(self.working.claims.get(&id).cloned())
    }

    async fn find_claim_by_number(
        &mut self,
        claim_number: &str,
    ) -> Result<Option<Claim>, PortError> {
        Ok(self
            .working
            .claims
            .values()
            .find(|c| c.claim_number == claim_number)
            .cloned())
    }

    async fn claims_for_payer(
        &mut self,
        payer_id: PayerId,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, PortError> {
        let mut claims: Vec<Claim> = self
            .working
            .claims
            .values()
            .filter(|c| c.payer_id == payer_id && statuses.contains(&c.status))
            .cloned()
            .collect();
        claims.sort_by(|a, b| a.claim_number.cmp(&b.claim_number));
        Ok(claims)
    }

    async fn insert_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        if self.working.claims.contains_key(&claim.id) {
            return Err(duplicate("Claim", claim.id));
        }
        if self.working.claims.values().any(|c| c.claim_number == claim.claim_number) {
            return Err(duplicate("Claim number", &claim.claim_number));
        }
        self.working.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn update_claim(&mut self, claim: &Claim) -> Result<(), PortError> {
        match self.working.claims.get_mut(&claim.id) {
            Some(stored) => {
                *stored = claim.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Claim", claim.id)),
        }
    }

    async fn append_history(&mut self, entry: &ClaimStatusHistoryEntry) -> Result<(), PortError> {
        if !self.working.claims.contains_key(&entry.claim_id) {
            return Err(PortError::not_found("Claim", entry.claim_id));
        }
        self.working.history.push(entry.clone());
        Ok(())
    }

    async fn load_history(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimStatusHistoryEntry>, PortError> {
        Ok(self
            .working
            .history
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .cloned()
            .collect())
    }

    async fn load_payment(&mut self, id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        if self.working.payments.contains_key(&payment.id) {
            return Err(duplicate("Payment", payment.id));
        }
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<(), PortError> {
        match self.working.payments.get_mut(&payment.id) {
            Some(stored) => {
                *stored = payment.clone();
                Ok(())
            }
            None => Err(PortError::not_found("Payment", payment.id)),
        }
    }

    async fn insert_claim_payment(
        &mut self,
        claim_payment: &ClaimPayment,
    ) -> Result<(), PortError> {
        if !self.working.payments.contains_key(&claim_payment.payment_id) {
            return Err(PortError::not_found("Payment", claim_payment.payment_id));
        }
        if !self.working.claims.contains_key(&claim_payment.claim_id) {
            return Err(PortError::not_found("Claim", claim_payment.claim_id));
        }
        self.working.claim_payments.push(claim_payment.clone());
        Ok(())
    }

    async fn claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<Vec<ClaimPayment>, PortError> {
        Ok(self
            .working
            .claim_payments
            .iter()
            .filter(|cp| cp.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn claim_payments_for_claim(
        &mut self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimPayment>, PortError> {
        Ok(self
            .working
            .claim_payments
            .iter()
            .filter(|cp| cp.claim_id == claim_id)
            .cloned()
            .collect())
    }

    async fn delete_claim_payments_for_payment(
        &mut self,
        payment_id: PaymentId,
    ) -> Result<u64, PortError> {
        let before = self.working.claim_payments.len();
        self.working.claim_payments.retain(|cp| cp.payment_id != payment_id);
        Ok((before - self.working.claim_payments.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let latency = self.faults.commit_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(PortError::internal("injected commit failure"));
        }
        let MemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}

// ============================================================================
// Directory
// ============================================================================

/// In-memory client and payer directory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    clients: Arc<RwLock<HashMap<ClientId, DirectoryEntry>>>,
    payers: Arc<RwLock<HashMap<PayerId, DirectoryEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(&self, id: ClientId, name: impl Into<String>, status: PartyStatus) {
        let entry = DirectoryEntry {
            id: *id.as_uuid(),
            name: name.into(),
            status,
        };
        self.clients.write().await.insert(id, entry);
    }

    pub async fn add_payer(&self, id: PayerId, name: impl Into<String>, status: PartyStatus) {
        let entry = DirectoryEntry {
            id: *id.as_uuid(),
            name: name.into(),
            status,
        };
        self.payers.write().await.insert(id, entry);
    }

    pub async fn set_payer_status(&self, id: PayerId, status: PartyStatus) {
        if let Some(entry) = self.payers.write().await.get_mut(&id) {
            entry.status = status;
        }
    }

    pub async fn set_client_status(&self, id: ClientId, status: PartyStatus) {
        if let Some(entry) = self.clients.write().await.get_mut(&id) {
            entry.status = status;
        }
    }
}

impl DomainPort for InMemoryDirectory {}

#[async_trait]
impl DirectoryPort for InMemoryDirectory {
    async fn get_client(&self, id: ClientId) -> Result<DirectoryEntry, PortError> {
        self.clients
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Client", id))
    }

    async fn get_payer(&self, id: PayerId) -> Result<DirectoryEntry, PortError> {
        self.payers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Payer", id))
    }
}

// ============================================================================
// Recording sinks
// ============================================================================

/// Keeps every emitted signal
#[derive(Debug, Default)]
pub struct RecordingObservability {
    signals: StdMutex<Vec<Signal>>,
}

impl RecordingObservability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DomainPort for RecordingObservability {}

impl ObservabilityPort for RecordingObservability {
    fn emit(&self, signal: Signal) {
        self.signals.lock().unwrap_or_else(|e| e.into_inner()).push(signal);
    }
}

/// Keeps every delivered event; optionally refuses delivery
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: StdMutex<Vec<LifecycleEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }
}

impl DomainPort for RecordingNotifier {}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn notify(&self, event: &LifecycleEvent) -> Result<(), PortError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::ServiceUnavailable {
                service: "notifier".to_string(),
            });
        }
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
        Ok(())
    }
}
