//! Shared harness: an engine wired to in-memory adapters

#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{AuthorizationId, ClientId, PayerId, ServiceId};
use domain_billing::{Authorization, BillingStatus, DocumentType, Service, ServiceType};
use domain_claims::{Claim, ClaimStatus, ClaimStatusUpdate, SubmissionMethod};
use domain_payment::{Payment, PaymentMethod};
use domain_revenue::adapters::{
    InMemoryDirectory, InMemoryStore, RecordingNotifier, RecordingObservability,
};
use domain_revenue::{
    ConvertRequest, EngineConfig, EngineContext, NewDocument, NewPayment, NewService, PartyStatus,
    RevenueEngine,
};
use test_utils::{
    AuthorizationBuilder, DateFixtures, IdFixtures, ServiceBuilder, ServiceTypeFixtures,
};

pub const ACTOR: &str = "biller@clinic";

pub struct Harness {
    pub engine: RevenueEngine,
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub signals: Arc<RecordingObservability>,
    pub notifier: Arc<RecordingNotifier>,
    pub client_id: ClientId,
    pub payer_id: PayerId,
    pub service_type: ServiceType,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(EngineConfig::default(), RecordingNotifier::new()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self::build(config, RecordingNotifier::new()).await
    }

    pub async fn with_notifier(notifier: RecordingNotifier) -> Self {
        Self::build(EngineConfig::default(), notifier).await
    }

    async fn build(config: EngineConfig, notifier: RecordingNotifier) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let signals = Arc::new(RecordingObservability::new());
        let notifier = Arc::new(notifier);

        let ctx = EngineContext::new(
            store.clone(),
            directory.clone(),
            signals.clone(),
            notifier.clone(),
            config,
        );
        let engine = RevenueEngine::new(ctx);

        let client_id = IdFixtures::client_id();
        let payer_id = IdFixtures::payer_id();
        directory.add_client(client_id, IdFixtures::person_name(), PartyStatus::Active).await;
        directory.add_payer(payer_id, "Medicaid", PartyStatus::Active).await;

        let service_type = engine
            .intake
            .register_service_type(ServiceTypeFixtures::general())
            .await
            .expect("service type registered");

        Self {
            engine,
            store,
            directory,
            signals,
            notifier,
            client_id,
            payer_id,
            service_type,
        }
    }

    /// A second active client
    pub async fn other_client(&self) -> ClientId {
        let client_id = IdFixtures::client_id();
        self.directory
            .add_client(client_id, IdFixtures::person_name(), PartyStatus::Active)
            .await;
        client_id
    }

    /// A second active payer
    pub async fn other_payer(&self) -> PayerId {
        let payer_id = IdFixtures::payer_id();
        self.directory.add_payer(payer_id, "Commercial", PartyStatus::Active).await;
        payer_id
    }

    pub fn signed_note() -> NewDocument {
        NewDocument {
            document_type: DocumentType::ProgressNote,
            content: "Client practiced coping skills.".to_string(),
            signed_by: Some("Dr. Rivera".to_string()),
            signed_at: Some(Utc::now() - chrono::Duration::hours(1)),
        }
    }

    /// A fully documented service for the default client and payer
    pub fn new_service(&self) -> NewService {
        NewService {
            client_id: self.client_id,
            service_type_id: self.service_type.id,
            payer_id: Some(self.payer_id),
            service_date: DateFixtures::recent_service_date(),
            units: dec!(2),
            rate: dec!(50),
            authorization_id: None,
            notes: None,
            documents: vec![Self::signed_note()],
        }
    }

    pub async fn authorization(&self, units: Decimal) -> Authorization {
        let authorization = AuthorizationBuilder::new()
            .for_client(self.client_id)
            .for_service_type(&self.service_type)
            .with_units(units)
            .build();
        self.engine
            .ledger
            .register(authorization)
            .await
            .expect("authorization registered")
    }

    pub async fn stored_authorization(&self, id: AuthorizationId) -> Authorization {
        self.store.snapshot().await.authorizations[&id].clone()
    }

    pub async fn stored_service(&self, id: ServiceId) -> Service {
        self.store.snapshot().await.services[&id].clone()
    }

    /// A builder preset to the default client, payer and service type
    pub fn service_builder(&self) -> ServiceBuilder {
        ServiceBuilder::new()
            .with_service_type(&self.service_type)
            .with_client(self.client_id)
            .with_payer(self.payer_id)
    }

    /// Stores a service directly, skipping intake
    pub async fn seed_service(&self, service: Service) -> Service {
        let stored = service.clone();
        self.store
            .modify(move |state| {
                state.services.insert(stored.id, stored);
            })
            .await;
        service
    }

    /// Stores an authorization directly, skipping the ledger
    pub async fn seed_authorization(&self, authorization: Authorization) -> Authorization {
        let stored = authorization.clone();
        self.store
            .modify(move |state| {
                state.authorizations.insert(stored.id, stored);
            })
            .await;
        authorization
    }

    /// Stores a claim directly, skipping conversion and history
    pub async fn seed_claim(&self, claim: Claim) -> Claim {
        let stored = claim.clone();
        self.store
            .modify(move |state| {
                state.claims.insert(stored.id, stored);
            })
            .await;
        claim
    }

    pub async fn record(&self, new: NewService) -> Service {
        self.engine.intake.record_service(new, ACTOR).await.expect("service recorded")
    }

    /// Records and validates a service with `units` at $50
    pub async fn ready_service(
        &self,
        units: Decimal,
        authorization_id: Option<AuthorizationId>,
    ) -> Service {
        let mut new = self.new_service();
        new.units = units;
        new.authorization_id = authorization_id;
        self.validated(new).await
    }

    /// Records and validates a single-unit service billed at `rate`
    pub async fn ready_service_at(&self, rate: Decimal) -> Service {
        let mut new = self.new_service();
        new.units = dec!(1);
        new.rate = rate;
        self.validated(new).await
    }

    async fn validated(&self, new: NewService) -> Service {
        let service = self.record(new).await;
        let report = self
            .engine
            .readiness
            .validate(service.id, ACTOR)
            .await
            .expect("validation ran");
        assert!(report.result.is_valid, "service should be valid: {:?}", report.result.errors);
        assert_eq!(report.billing_status, BillingStatus::ReadyForBilling);
        self.stored_service(service.id).await
    }

    pub async fn draft_claim(&self, service_ids: Vec<ServiceId>) -> Claim {
        self.engine
            .lifecycle
            .convert_services_to_claim(
                ConvertRequest {
                    payer_id: self.payer_id,
                    service_ids,
                    notes: None,
                },
                ACTOR,
            )
            .await
            .expect("claim created")
    }

    pub fn submit() -> ClaimStatusUpdate {
        ClaimStatusUpdate::Submit {
            method: SubmissionMethod::Electronic,
            date: DateFixtures::days_ago(1),
        }
    }

    pub async fn advance(&self, claim: &Claim, update: ClaimStatusUpdate) -> Claim {
        self.engine
            .lifecycle
            .update_status(claim.id, update, ACTOR, None)
            .await
            .expect("status updated")
    }

    /// A SUBMITTED claim over `count` services of $100 each
    pub async fn submitted_claim(&self, count: usize) -> Claim {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(self.ready_service(dec!(2), None).await.id);
        }
        let claim = self.draft_claim(ids).await;
        self.advance(&claim, Self::submit()).await
    }

    /// A SUBMITTED claim with one service per amount
    pub async fn submitted_claim_of(&self, amounts: &[Decimal]) -> Claim {
        let mut ids = Vec::with_capacity(amounts.len());
        for amount in amounts {
            ids.push(self.ready_service_at(*amount).await.id);
        }
        let claim = self.draft_claim(ids).await;
        self.advance(&claim, Self::submit()).await
    }

    /// A PENDING claim over `count` services of $100 each
    pub async fn pending_claim(&self, count: usize) -> Claim {
        let claim = self.submitted_claim(count).await;
        let claim = self.advance(&claim, ClaimStatusUpdate::Acknowledge).await;
        self.advance(&claim, ClaimStatusUpdate::MarkPending).await
    }

    pub async fn payment(&self, amount: Decimal) -> Payment {
        self.engine
            .reconciliation
            .record_payment(
                NewPayment {
                    payer_id: self.payer_id,
                    amount,
                    method: PaymentMethod::Eft,
                    payment_date: DateFixtures::days_ago(1),
                    reference_number: Some("EFT-0001".to_string()),
                    remittance_file: None,
                    notes: None,
                },
                ACTOR,
            )
            .await
            .expect("payment recorded")
    }

    pub async fn claim(&self, id: core_kernel::ClaimId) -> Claim {
        self.engine.lifecycle.get_claim(id).await.expect("claim exists")
    }

    pub async fn claim_status(&self, id: core_kernel::ClaimId) -> ClaimStatus {
        self.claim(id).await.status
    }
}
