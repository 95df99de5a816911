//! Integration tests for service intake and billing-status transitions

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::DateRange;
use domain_billing::{BillingStatus, DocumentType, DocumentationStatus};
use domain_revenue::{PartyStatus, ReasonCode, RevenueError, Signal};
use test_utils::{
    assert_money_eq, rate_strategy, units_strategy, AuthorizationBuilder, DateFixtures,
    DocumentFixtures,
};

use common::{Harness, ACTOR};

// ============================================================================
// Recording
// ============================================================================

mod recording {
    use super::*;

    #[tokio::test]
    async fn test_record_service_reserves_units() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(20)).await;
        let mut new = h.new_service();
        new.units = dec!(6);
        new.authorization_id = Some(authorization.id);

        let service = h.record(new).await;

        assert_eq!(service.billing_status, BillingStatus::Unbilled);
        assert_eq!(service.documentation_status, DocumentationStatus::Complete);
        assert_eq!(service.reserved_units, dec!(6));
        assert_eq!(service.amount.amount(), dec!(300));
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, dec!(6));
        assert_eq!(h.notifier.event_names(), vec!["service_recorded"]);
    }

    #[tokio::test]
    async fn test_record_beyond_authorization_stores_nothing() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(4)).await;
        let mut new = h.new_service();
        new.units = dec!(5);
        new.authorization_id = Some(authorization.id);

        let err = h.engine.intake.record_service(new, ACTOR).await.unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::AuthorizationUnitsExceeded));
        let state = h.store.snapshot().await;
        assert!(state.services.is_empty());
        assert_eq!(state.authorizations[&authorization.id].used_units, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_record_rejects_non_positive_units() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.units = dec!(-1);

        let err = h.engine.intake.record_service(new, ACTOR).await.unwrap_err();

        match err {
            RevenueError::Validation(fields) => assert!(fields.iter().any(|f| f.field == "units")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_with_overflowing_amount_is_refused() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.units = Decimal::MAX;
        new.rate = dec!(2);

        let err = h.engine.intake.record_service(new, ACTOR).await.unwrap_err();

        match err {
            RevenueError::Validation(fields) => assert!(fields.iter().any(|f| f.field == "amount")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(h.store.snapshot().await.services.is_empty());
    }

    #[tokio::test]
    async fn test_record_for_inactive_client_is_refused() {
        let h = Harness::new().await;
        h.directory.set_client_status(h.client_id, PartyStatus::Inactive).await;

        let err = h.engine.intake.record_service(h.new_service(), ACTOR).await.unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::PartyInactive));
    }

    #[tokio::test]
    async fn test_service_without_documents_is_incomplete() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.documents.clear();

        let service = h.record(new).await;

        assert_eq!(service.documentation_status, DocumentationStatus::Incomplete);
    }

    #[tokio::test]
    async fn test_attach_document_completes_documentation() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.documents.clear();
        let service = h.record(new).await;

        let updated = h
            .engine
            .intake
            .attach_document(service.id, Harness::signed_note(), ACTOR)
            .await
            .unwrap();

        assert_eq!(updated.documentation_status, DocumentationStatus::Complete);
        assert_eq!(updated.documents[0].document_type, DocumentType::ProgressNote);
    }

    #[tokio::test]
    async fn test_import_reports_each_failure() {
        let h = Harness::new().await;
        let mut bad = h.new_service();
        bad.rate = Decimal::ZERO;
        let batch = vec![h.new_service(), bad, h.new_service()];

        let outcome = h.engine.intake.import_services(batch, ACTOR).await;

        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert_eq!(h.store.snapshot().await.services.len(), 2);
    }
}

// ============================================================================
// Editing
// ============================================================================

mod editing {
    use super::*;

    #[tokio::test]
    async fn test_unit_changes_move_the_reservation() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(20)).await;
        let mut new = h.new_service();
        new.units = dec!(4);
        new.authorization_id = Some(authorization.id);
        let service = h.record(new).await;

        let grown = h
            .engine
            .intake
            .update_units_and_rate(service.id, dec!(10), dec!(50), ACTOR)
            .await
            .unwrap();
        assert_eq!(grown.reserved_units, dec!(10));
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, dec!(10));

        let shrunk = h
            .engine
            .intake
            .update_units_and_rate(service.id, dec!(3), dec!(60), ACTOR)
            .await
            .unwrap();
        assert_eq!(shrunk.amount.amount(), dec!(180));
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, dec!(3));
    }

    #[tokio::test]
    async fn test_growth_beyond_grant_keeps_old_values() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(5)).await;
        let mut new = h.new_service();
        new.units = dec!(4);
        new.authorization_id = Some(authorization.id);
        let service = h.record(new).await;

        let err = h
            .engine
            .intake
            .update_units_and_rate(service.id, dec!(6), dec!(50), ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::AuthorizationUnitsExceeded));
        assert_eq!(h.stored_service(service.id).await.units, dec!(4));
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, dec!(4));
    }

    #[tokio::test]
    async fn test_service_on_claim_is_locked() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        h.draft_claim(vec![service.id]).await;

        let err = h
            .engine
            .intake
            .update_units_and_rate(service.id, dec!(3), dec!(50), ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ServiceLocked));
    }
}

// ============================================================================
// Billing status transitions
// ============================================================================

mod transitions {
    use super::*;

    #[tokio::test]
    async fn test_ready_for_billing_requires_validation() {
        let h = Harness::new().await;
        let service = h.record(h.new_service()).await;

        let err = h
            .engine
            .intake
            .transition_billing_status(service.id, BillingStatus::ReadyForBilling, ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ValidationRequired));
        assert_eq!(h.stored_service(service.id).await.billing_status, BillingStatus::Unbilled);
    }

    #[tokio::test]
    async fn test_ready_service_can_return_to_unbilled() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;

        let service = h
            .engine
            .intake
            .transition_billing_status(service.id, BillingStatus::Unbilled, ACTOR)
            .await
            .unwrap();

        assert_eq!(service.billing_status, BillingStatus::Unbilled);
    }

    #[tokio::test]
    async fn test_illegal_edge_is_rejected_and_signalled() {
        let h = Harness::new().await;
        let service = h.record(h.new_service()).await;

        let err = h
            .engine
            .intake
            .transition_billing_status(service.id, BillingStatus::Paid, ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::InvalidBillingStatusTransition));
        assert!(h.signals.signals().iter().any(
            |s| matches!(s, Signal::TransitionRejected { entity, .. } if entity == "service")
        ));
    }

    #[tokio::test]
    async fn test_void_releases_units() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(10)).await;
        let mut new = h.new_service();
        new.units = dec!(4);
        new.authorization_id = Some(authorization.id);
        let service = h.record(new).await;

        let voided =
            h.engine.intake.void_service(service.id, "entered twice", ACTOR).await.unwrap();

        assert_eq!(voided.billing_status, BillingStatus::Void);
        assert_eq!(voided.reserved_units, Decimal::ZERO);
        assert!(voided.notes.unwrap().contains("Voided: entered twice"));
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_void_requires_reason() {
        let h = Harness::new().await;
        let service = h.record(h.new_service()).await;

        let err = h.engine.intake.void_service(service.id, "  ", ACTOR).await.unwrap_err();

        assert!(matches!(err, RevenueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_service_on_claim_cannot_be_voided_directly() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        h.draft_claim(vec![service.id]).await;

        let err = h.engine.intake.void_service(service.id, "duplicate", ACTOR).await.unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ClaimDrivenTransition));
        assert_eq!(h.stored_service(service.id).await.billing_status, BillingStatus::InClaim);
    }

    #[tokio::test]
    async fn test_void_is_terminal() {
        let h = Harness::new().await;
        let service = h.record(h.new_service()).await;
        h.engine.intake.void_service(service.id, "error", ACTOR).await.unwrap();

        let err = h
            .engine
            .intake
            .transition_billing_status(service.id, BillingStatus::Unbilled, ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::InvalidBillingStatusTransition));
    }
}

// ============================================================================
// Readiness
// ============================================================================

mod readiness {
    use super::*;

    #[tokio::test]
    async fn test_valid_service_advances() {
        let h = Harness::new().await;
        let service = h.record(h.new_service()).await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(report.result.is_valid);
        assert!(report.advanced);
        assert_eq!(
            h.stored_service(service.id).await.billing_status,
            BillingStatus::ReadyForBilling
        );
    }

    #[tokio::test]
    async fn test_invalid_service_stays_unbilled() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.documents.clear();
        let service = h.record(new).await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(!report.result.is_valid);
        assert!(!report.advanced);
        assert!(report.result.errors.iter().any(|e| e.contains("INCOMPLETE")));
        assert_eq!(h.stored_service(service.id).await.billing_status, BillingStatus::Unbilled);
    }

    #[tokio::test]
    async fn test_future_service_date_fails() {
        let h = Harness::new().await;
        let mut new = h.new_service();
        new.service_date = DateFixtures::days_ahead(3);
        let service = h.record(new).await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(report.result.errors.iter().any(|e| e.contains("future")));
    }

    #[tokio::test]
    async fn test_own_reservation_counts_as_available() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(5)).await;
        let mut new = h.new_service();
        new.units = dec!(5);
        new.authorization_id = Some(authorization.id);
        let service = h.record(new).await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(report.result.is_valid, "{:?}", report.result.errors);
    }

    #[tokio::test]
    async fn test_service_outside_authorization_window_fails() {
        let h = Harness::new().await;
        let window =
            DateRange::new(DateFixtures::days_ago(120), DateFixtures::days_ago(60)).unwrap();
        let authorization = h
            .seed_authorization(
                AuthorizationBuilder::new()
                    .for_client(h.client_id)
                    .for_service_type(&h.service_type)
                    .with_units(dec!(10))
                    .with_used(dec!(2))
                    .with_validity(window)
                    .build(),
            )
            .await;
        let service = h
            .seed_service(
                h.service_builder()
                    .with_date(DateFixtures::days_ago(5))
                    .with_units(dec!(2))
                    .with_authorization(authorization.id)
                    .build(),
            )
            .await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(!report.advanced);
        assert!(
            report.result.errors.iter().any(|e| e.contains("outside authorization window")),
            "{:?}",
            report.result.errors
        );
        assert_eq!(h.stored_service(service.id).await.billing_status, BillingStatus::Unbilled);
    }

    #[tokio::test]
    async fn test_unsigned_note_blocks_billing() {
        let h = Harness::new().await;
        let service = h
            .seed_service(
                h.service_builder()
                    .with_documents(vec![DocumentFixtures::unsigned(DocumentType::ProgressNote)])
                    .build(),
            )
            .await;

        let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

        assert!(!report.result.is_valid);
        assert!(report.result.errors.iter().any(|e| e.contains("signer is missing")));
        assert!(!report.advanced);
    }

    #[tokio::test]
    async fn test_duplicates_only_warn() {
        let h = Harness::new().await;
        h.record(h.new_service()).await;
        let second = h.record(h.new_service()).await;

        let report = h.engine.readiness.validate(second.id, ACTOR).await.unwrap();

        assert!(report.result.is_valid);
        assert!(!report.result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_validate_many_isolates_failures() {
        let h = Harness::new().await;
        let good = h.record(h.new_service()).await;
        let missing = core_kernel::ServiceId::new();

        let batch = h.engine.readiness.validate_many(&[good.id, missing], ACTOR).await;

        assert_eq!(batch.total(), 2);
        assert_eq!(batch.advanced_count(), 1);
        assert_eq!(batch.failed.len(), 1);
        assert!(batch.failed[0].error.is_not_found());
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// A documented service at any units and rate validates with amount = units x rate
    #[test]
    fn documented_services_validate_at_their_price(
        units in units_strategy(),
        rate in rate_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new().await;
            let service = h
                .seed_service(h.service_builder().with_units(units).with_rate(rate).build())
                .await;

            let report = h.engine.readiness.validate(service.id, ACTOR).await.unwrap();

            prop_assert!(report.result.is_valid, "{:?}", report.result.errors);
            let stored = h.stored_service(service.id).await;
            prop_assert_eq!(stored.billing_status, BillingStatus::ReadyForBilling);
            assert_money_eq(&stored.amount, units * rate);
            Ok(())
        })?;
    }
}
