//! PostgreSQL adapter tests
//!
//! These start a PostgreSQL container and are ignored by default:
//!
//! ```bash
//! cargo test -p infra_db -- --ignored
//! ```

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{AdapterHealth, ClientId, HealthCheckable, PayerId, PortError};
use domain_billing::{BillingStatus, DocumentType, Service, ServiceType};
use domain_claims::{ClaimStatus, ClaimStatusUpdate, SubmissionMethod};
use domain_payment::{PaymentMethod, ReconciliationStatus};
use domain_revenue::adapters::{RecordingNotifier, RecordingObservability};
use domain_revenue::{
    BillingStore, ClaimMatch, ConvertRequest, DirectoryPort, EngineConfig, EngineContext,
    NewDocument, NewPayment, NewService, PartyStatus, RevenueEngine,
};
use infra_db::{PostgresBillingStore, PostgresDirectory};
use test_utils::{
    create_isolated_test_database, AuthorizationBuilder, ClaimBuilder, DateFixtures, IdFixtures,
    PaymentBuilder, ServiceTypeFixtures, TestDatabase,
};

const ACTOR: &str = "biller@clinic";

struct PgHarness {
    _db: TestDatabase,
    engine: RevenueEngine,
    store: Arc<PostgresBillingStore>,
    directory: Arc<PostgresDirectory>,
    client_id: ClientId,
    payer_id: PayerId,
    service_type: ServiceType,
}

impl PgHarness {
    async fn new() -> Self {
        let db = create_isolated_test_database().await.expect("database started");
        let store = Arc::new(PostgresBillingStore::new(db.pool.clone()));
        let directory = Arc::new(PostgresDirectory::new(db.pool.clone()));

        let client_id = IdFixtures::client_id();
        let payer_id = IdFixtures::payer_id();
        directory
            .register_client(client_id, &IdFixtures::person_name(), PartyStatus::Active)
            .await
            .expect("client registered");
        directory
            .register_payer(payer_id, "Medicaid", PartyStatus::Active)
            .await
            .expect("payer registered");

        let ctx = EngineContext::new(
            store.clone(),
            directory.clone(),
            Arc::new(RecordingObservability::new()),
            Arc::new(RecordingNotifier::new()),
            EngineConfig::default(),
        );

        let engine = RevenueEngine::new(ctx);
        let service_type = engine
            .intake
            .register_service_type(ServiceTypeFixtures::general())
            .await
            .expect("service type registered");

        Self {
            _db: db,
            engine,
            store,
            directory,
            client_id,
            payer_id,
            service_type,
        }
    }

    async fn ready_service(&self) -> Service {
        let service = self
            .engine
            .intake
            .record_service(
                NewService {
                    client_id: self.client_id,
                    service_type_id: self.service_type.id,
                    payer_id: Some(self.payer_id),
                    service_date: DateFixtures::recent_service_date(),
                    units: dec!(2),
                    rate: dec!(50),
                    authorization_id: None,
                    notes: None,
                    documents: vec![NewDocument {
                        document_type: DocumentType::ProgressNote,
                        content: "Session completed.".to_string(),
                        signed_by: Some("Dr. Rivera".to_string()),
                        signed_at: Some(Utc::now() - chrono::Duration::hours(1)),
                    }],
                },
                ACTOR,
            )
            .await
            .expect("service recorded");
        let report = self
            .engine
            .readiness
            .validate(service.id, ACTOR)
            .await
            .expect("validation ran");
        assert_eq!(report.billing_status, BillingStatus::ReadyForBilling);
        service
    }
}

// ============================================================================
// Store
// ============================================================================

#[tokio::test]
#[ignore = "requires docker"]
async fn test_service_survives_round_trip() {
    let h = PgHarness::new().await;
    let service = h.ready_service().await;

    let mut tx = h.store.begin().await.unwrap();
    let loaded = tx.load_service(service.id).await.unwrap().expect("service stored");
    tx.rollback().await.unwrap();

    assert_eq!(loaded.billing_status, BillingStatus::ReadyForBilling);
    assert_eq!(loaded.amount, service.amount);
    assert_eq!(loaded.units, dec!(2));
    assert_eq!(loaded.documents.len(), 1);
    assert_eq!(loaded.documents[0].signed_by.as_deref(), Some("Dr. Rivera"));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_rollback_discards_writes() {
    let h = PgHarness::new().await;
    let payment = PaymentBuilder::new().for_payer(h.payer_id).build();

    let mut tx = h.store.begin().await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.rollback().await.unwrap();

    let mut tx = h.store.begin().await.unwrap();
    assert!(tx.load_payment(payment.id).await.unwrap().is_none());
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_duplicate_claim_number_is_conflict() {
    let h = PgHarness::new().await;
    let first = ClaimBuilder::new()
        .for_client(h.client_id)
        .for_payer(h.payer_id)
        .with_number("CLM-DUP-1")
        .build();
    let second = ClaimBuilder::new()
        .for_client(h.client_id)
        .for_payer(h.payer_id)
        .with_number("CLM-DUP-1")
        .build();

    let mut tx = h.store.begin().await.unwrap();
    tx.insert_claim(&first).await.unwrap();
    let err = tx.insert_claim(&second).await.unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(err, PortError::Conflict { .. }));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_authorization_overuse_is_refused() {
    let h = PgHarness::new().await;
    let service_type = h
        .engine
        .intake
        .register_service_type(ServiceTypeFixtures::therapy())
        .await
        .unwrap();
    let authorization = AuthorizationBuilder::new()
        .for_client(h.client_id)
        .for_service_type(&service_type)
        .with_units(dec!(10))
        .build();
    let mut authorization = h.engine.ledger.register(authorization).await.unwrap();

    authorization.used_units = dec!(11);
    let mut tx = h.store.begin().await.unwrap();
    let err = tx.update_authorization(&authorization).await.unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(err, PortError::Validation { .. }));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_update_of_missing_claim_is_not_found() {
    let h = PgHarness::new().await;
    let claim = ClaimBuilder::new().for_client(h.client_id).for_payer(h.payer_id).build();

    let mut tx = h.store.begin().await.unwrap();
    let err = tx.update_claim(&claim).await.unwrap_err();
    tx.rollback().await.unwrap();

    assert!(err.is_not_found());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_health_check_reports_healthy() {
    let h = PgHarness::new().await;
    let result = h.store.health_check().await;
    assert_eq!(result.status, AdapterHealth::Healthy);
    assert_eq!(result.adapter_id, "postgres-billing-store");
}

// ============================================================================
// Directory
// ============================================================================

#[tokio::test]
#[ignore = "requires docker"]
async fn test_directory_lookups() {
    let h = PgHarness::new().await;

    let payer = h.directory.get_payer(h.payer_id).await.unwrap();
    assert_eq!(payer.name, "Medicaid");
    assert!(payer.is_active());

    h.directory
        .register_payer(h.payer_id, "Medicaid", PartyStatus::Inactive)
        .await
        .unwrap();
    assert!(!h.directory.get_payer(h.payer_id).await.unwrap().is_active());

    let err = h.directory.get_client(IdFixtures::client_id()).await.unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Engine over PostgreSQL
// ============================================================================

#[tokio::test]
#[ignore = "requires docker"]
async fn test_claim_is_paid_end_to_end() {
    let h = PgHarness::new().await;
    let first = h.ready_service().await;
    let second = h.ready_service().await;

    let claim = h
        .engine
        .lifecycle
        .convert_services_to_claim(
            ConvertRequest {
                payer_id: h.payer_id,
                service_ids: vec![first.id, second.id],
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(claim.total_amount.amount(), dec!(200));

    for update in [
        ClaimStatusUpdate::Submit {
            method: SubmissionMethod::Electronic,
            date: DateFixtures::days_ago(1),
        },
        ClaimStatusUpdate::Acknowledge,
        ClaimStatusUpdate::MarkPending,
    ] {
        h.engine.lifecycle.update_status(claim.id, update, ACTOR, None).await.unwrap();
    }

    let payment = h
        .engine
        .reconciliation
        .record_payment(
            NewPayment {
                payer_id: h.payer_id,
                amount: dec!(200),
                method: PaymentMethod::Eft,
                payment_date: DateFixtures::days_ago(1),
                reference_number: Some("EFT-7781".to_string()),
                remittance_file: None,
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap();

    let result = h
        .engine
        .reconciliation
        .reconcile(payment.id, vec![ClaimMatch::new(claim.id, dec!(200))], None, ACTOR)
        .await
        .unwrap();

    assert_eq!(result.status, ReconciliationStatus::Reconciled);
    assert_eq!(result.paid_claims, vec![claim.id]);

    let history = h.engine.lifecycle.claim_history(claim.id).await.unwrap();
    let statuses: Vec<ClaimStatus> = history.iter().map(|entry| entry.status).collect();
    assert_eq!(
        statuses,
        vec![
            ClaimStatus::Draft,
            ClaimStatus::Submitted,
            ClaimStatus::Acknowledged,
            ClaimStatus::Pending,
            ClaimStatus::Paid,
        ]
    );

    let mut tx = h.store.begin().await.unwrap();
    let allocations = tx.claim_payments_for_claim(claim.id).await.unwrap();
    let services = tx.services_for_claim(claim.id).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].paid_amount.amount(), dec!(200));
    assert!(services.iter().all(|s| s.billing_status == BillingStatus::Billed));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_undo_removes_allocations() {
    let h = PgHarness::new().await;
    let service = h.ready_service().await;
    let claim = h
        .engine
        .lifecycle
        .convert_services_to_claim(
            ConvertRequest {
                payer_id: h.payer_id,
                service_ids: vec![service.id],
                notes: None,
            },
            ACTOR,
        )
        .await
        .unwrap();
    h.engine
        .lifecycle
        .update_status(
            claim.id,
            ClaimStatusUpdate::Submit {
                method: SubmissionMethod::Portal,
                date: DateFixtures::days_ago(2),
            },
            ACTOR,
            None,
        )
        .await
        .unwrap();

    let payment = PaymentBuilder::new().for_payer(h.payer_id).with_amount(dec!(100)).build();
    let mut tx = h.store.begin().await.unwrap();
    tx.insert_payment(&payment).await.unwrap();
    tx.commit().await.unwrap();

    h.engine
        .reconciliation
        .reconcile(payment.id, vec![ClaimMatch::new(claim.id, dec!(100))], None, ACTOR)
        .await
        .unwrap();
    let undo = h
        .engine
        .reconciliation
        .undo_reconciliation(payment.id, None, ACTOR)
        .await
        .unwrap();

    assert_eq!(undo.removed, 1);
    assert_eq!(undo.status, ReconciliationStatus::Unreconciled);

    let restored = h.engine.lifecycle.get_claim(claim.id).await.unwrap();
    assert_eq!(restored.status, ClaimStatus::Submitted);
}
