//! Integration tests for claim creation, status changes and cascades

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use domain_billing::BillingStatus;
use domain_claims::{ClaimStatus, ClaimStatusUpdate, ClaimType, HistoryEntryKind};
use domain_revenue::{ConvertRequest, ReasonCode, RevenueError, Signal};
use test_utils::{
    assert_history_is_legal_path, assert_history_statuses, assert_money_eq, claim_path_strategy,
    DateFixtures,
};

use common::{Harness, ACTOR};

// ============================================================================
// Conversion
// ============================================================================

mod conversion {
    use super::*;

    #[tokio::test]
    async fn test_convert_creates_draft_claim() {
        let h = Harness::new().await;
        let first = h.ready_service(dec!(2), None).await;
        let mut later = h.new_service();
        later.service_date = DateFixtures::days_ago(3);
        let later = h.record(later).await;
        h.engine.readiness.validate(later.id, ACTOR).await.unwrap();

        let claim = h.draft_claim(vec![first.id, later.id]).await;

        assert_eq!(claim.status, ClaimStatus::Draft);
        assert_eq!(claim.claim_type, ClaimType::Original);
        assert_eq!(claim.total_amount.amount(), dec!(200));
        assert_eq!(claim.service_period.start, first.service_date);
        assert_eq!(claim.service_period.end, DateFixtures::days_ago(3));
        for id in [first.id, later.id] {
            let service = h.stored_service(id).await;
            assert_eq!(service.billing_status, BillingStatus::InClaim);
            assert_eq!(service.claim_id, Some(claim.id));
        }
        let history = h.engine.lifecycle.claim_history(claim.id).await.unwrap();
        assert_history_statuses(&history, &[ClaimStatus::Draft]);
    }

    #[tokio::test]
    async fn test_claim_total_is_sum_of_service_amounts() {
        let h = Harness::new().await;
        let fifty = h.ready_service_at(dec!(50)).await;
        let seventy_five = h.ready_service_at(dec!(75)).await;

        let claim = h.draft_claim(vec![fifty.id, seventy_five.id]).await;

        assert_money_eq(&claim.total_amount, dec!(125));
        assert_eq!(claim.service_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_one_unready_service_aborts_everything() {
        let h = Harness::new().await;
        let ready = h.ready_service(dec!(2), None).await;
        let unbilled = h.record(h.new_service()).await;

        let err = h
            .engine
            .lifecycle
            .convert_services_to_claim(
                ConvertRequest {
                    payer_id: h.payer_id,
                    service_ids: vec![ready.id, unbilled.id],
                    notes: None,
                },
                ACTOR,
            )
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ServiceNotReady));
        let state = h.store.snapshot().await;
        assert!(state.claims.is_empty());
        assert!(state.history.is_empty());
        assert_eq!(state.services[&ready.id].billing_status, BillingStatus::ReadyForBilling);
        assert_eq!(state.services[&ready.id].claim_id, None);
    }

    #[tokio::test]
    async fn test_services_of_two_clients_are_refused() {
        let h = Harness::new().await;
        let mine = h.ready_service(dec!(2), None).await;
        let mut theirs = h.new_service();
        theirs.client_id = h.other_client().await;
        let theirs = h.record(theirs).await;
        h.engine.readiness.validate(theirs.id, ACTOR).await.unwrap();

        let err = h
            .engine
            .lifecycle
            .convert_services_to_claim(
                ConvertRequest {
                    payer_id: h.payer_id,
                    service_ids: vec![mine.id, theirs.id],
                    notes: None,
                },
                ACTOR,
            )
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ClientMismatch));
    }

    #[tokio::test]
    async fn test_empty_and_duplicate_lists_are_invalid() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;

        for service_ids in [vec![], vec![service.id, service.id]] {
            let err = h
                .engine
                .lifecycle
                .convert_services_to_claim(
                    ConvertRequest {
                        payer_id: h.payer_id,
                        service_ids,
                        notes: None,
                    },
                    ACTOR,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, RevenueError::Validation(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_unvalidated_service_is_not_ready() {
        let h = Harness::new().await;
        let unbilled = h.seed_service(h.service_builder().build()).await;
        let billed = h
            .seed_service(h.service_builder().with_status(BillingStatus::Billed).build())
            .await;

        for service in [unbilled, billed] {
            let err = h
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
                .unwrap_err();
            assert_eq!(err.reason_code(), Some(ReasonCode::ServiceNotReady), "{err:?}");
        }
        assert!(h.store.snapshot().await.claims.is_empty());
    }

    #[tokio::test]
    async fn test_service_already_on_a_claim_is_not_ready() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        h.draft_claim(vec![service.id]).await;

        let err = h
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
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ServiceNotReady));
    }
}

// ============================================================================
// Status changes and cascades
// ============================================================================

mod status_changes {
    use super::*;

    #[tokio::test]
    async fn test_submission_bills_services() {
        let h = Harness::new().await;
        let claim = h.submitted_claim(2).await;

        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.submission_date, Some(DateFixtures::days_ago(1)));
        for id in &claim.service_ids {
            assert_eq!(h.stored_service(*id).await.billing_status, BillingStatus::Billed);
        }
    }

    #[tokio::test]
    async fn test_future_submission_date_is_invalid() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        let claim = h.draft_claim(vec![service.id]).await;

        let err = h
            .engine
            .lifecycle
            .update_status(
                claim.id,
                ClaimStatusUpdate::Submit {
                    method: domain_claims::SubmissionMethod::Portal,
                    date: DateFixtures::days_ahead(5),
                },
                ACTOR,
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RevenueError::Validation(_)));
        assert_eq!(h.claim_status(claim.id).await, ClaimStatus::Draft);
    }

    #[tokio::test]
    async fn test_denial_cascades_and_records_reason() {
        let h = Harness::new().await;
        let claim = h.pending_claim(1).await;

        let denied = h
            .advance(
                &claim,
                ClaimStatusUpdate::Deny {
                    reason: "CO-50".to_string(),
                    detail: Some("Not medically necessary".to_string()),
                    adjudication_date: DateFixtures::days_ago(1),
                },
            )
            .await;

        assert_eq!(denied.status, ClaimStatus::Denied);
        assert_eq!(denied.denial_reason.as_deref(), Some("CO-50"));
        assert_eq!(
            h.stored_service(claim.service_ids[0]).await.billing_status,
            BillingStatus::Denied
        );

        let history = h.engine.lifecycle.claim_history(claim.id).await.unwrap();
        assert_eq!(history.last().unwrap().notes.as_deref(), Some("CO-50"));
    }

    #[tokio::test]
    async fn test_denied_service_is_rebilled_on_a_new_claim() {
        let h = Harness::new().await;
        let claim = h.pending_claim(1).await;
        let service_id = claim.service_ids[0];
        h.advance(
            &claim,
            ClaimStatusUpdate::Deny {
                reason: "CO-16".to_string(),
                detail: None,
                adjudication_date: DateFixtures::days_ago(1),
            },
        )
        .await;

        let report = h.engine.readiness.validate(service_id, ACTOR).await.unwrap();

        assert!(report.result.is_valid, "{:?}", report.result.errors);
        assert!(report.advanced);
        assert_eq!(report.billing_status, BillingStatus::ReadyForBilling);
        let service = h.stored_service(service_id).await;
        assert_eq!(service.billing_status, BillingStatus::ReadyForBilling);
        assert!(service.claim_id.is_none());

        let rebilled = h.draft_claim(vec![service_id]).await;
        assert_ne!(rebilled.id, claim.id);
        assert_eq!(h.stored_service(service_id).await.claim_id, Some(rebilled.id));
        assert_eq!(h.claim_status(claim.id).await, ClaimStatus::Denied);
    }

    #[tokio::test]
    async fn test_illegal_transition_changes_nothing() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        let claim = h.draft_claim(vec![service.id]).await;

        let err = h
            .engine
            .lifecycle
            .update_status(claim.id, ClaimStatusUpdate::Acknowledge, ACTOR, None)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::InvalidClaimStatusTransition));
        assert_eq!(h.claim_status(claim.id).await, ClaimStatus::Draft);
        assert_eq!(h.engine.lifecycle.claim_history(claim.id).await.unwrap().len(), 1);
        assert!(h
            .signals
            .signals()
            .iter()
            .any(|s| matches!(s, Signal::TransitionRejected { entity, .. } if entity == "claim")));
    }

    #[tokio::test]
    async fn test_void_before_submission_frees_services() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        let claim = h.draft_claim(vec![service.id]).await;

        h.advance(&claim, ClaimStatusUpdate::Void { reason: "wrong payer".to_string() }).await;

        let service = h.stored_service(service.id).await;
        assert_eq!(service.billing_status, BillingStatus::ReadyForBilling);
        assert_eq!(service.claim_id, None);
        // the freed service can be billed again
        h.draft_claim(vec![service.id]).await;
    }

    #[tokio::test]
    async fn test_void_after_submission_voids_services_and_releases_units() {
        let h = Harness::new().await;
        let authorization = h.authorization(dec!(10)).await;
        let service = h.ready_service(dec!(4), Some(authorization.id)).await;
        let claim = h.draft_claim(vec![service.id]).await;
        let claim = h.advance(&claim, Harness::submit()).await;

        h.advance(&claim, ClaimStatusUpdate::Void { reason: "duplicate claim".to_string() }).await;

        assert_eq!(h.stored_service(service.id).await.billing_status, BillingStatus::Void);
        assert_eq!(h.stored_authorization(authorization.id).await.used_units, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_void_requires_reason() {
        let h = Harness::new().await;
        let claim = h.submitted_claim(1).await;

        let err = h
            .engine
            .lifecycle
            .update_status(claim.id, ClaimStatusUpdate::Void { reason: String::new() }, ACTOR, None)
            .await
            .unwrap_err();

        assert!(matches!(err, RevenueError::Validation(_)));
    }

    #[tokio::test]
    async fn test_full_path_history_is_legal() {
        let h = Harness::new().await;
        let claim = h.pending_claim(1).await;
        let claim = h
            .advance(
                &claim,
                ClaimStatusUpdate::Deny {
                    reason: "CO-16".to_string(),
                    detail: None,
                    adjudication_date: DateFixtures::days_ago(1),
                },
            )
            .await;
        let claim = h.advance(&claim, ClaimStatusUpdate::Appeal).await;
        h.advance(&claim, ClaimStatusUpdate::MarkPending).await;

        let history = h.engine.lifecycle.claim_history(claim.id).await.unwrap();
        assert_history_is_legal_path(&history);
        assert_history_statuses(
            &history,
            &[
                ClaimStatus::Draft,
                ClaimStatus::Submitted,
                ClaimStatus::Acknowledged,
                ClaimStatus::Pending,
                ClaimStatus::Denied,
                ClaimStatus::Appealed,
                ClaimStatus::Pending,
            ],
        );
        assert!(history.iter().all(|e| e.kind == HistoryEntryKind::Transition));
    }

    #[tokio::test]
    async fn test_missing_claim_is_not_found() {
        let h = Harness::new().await;
        let err = h.engine.lifecycle.get_claim(core_kernel::ClaimId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

// ============================================================================
// Related claims and settlement
// ============================================================================

mod related_and_settlement {
    use super::*;

    #[tokio::test]
    async fn test_adjustment_claim_references_original() {
        let h = Harness::new().await;
        let original = h.submitted_claim(1).await;

        let adjustment = h
            .engine
            .lifecycle
            .create_related_claim(original.id, ClaimType::Adjustment, Some(dec!(80)), None, ACTOR)
            .await
            .unwrap();

        assert_eq!(adjustment.claim_type, ClaimType::Adjustment);
        assert_eq!(adjustment.original_claim_id, Some(original.id));
        assert_eq!(adjustment.status, ClaimStatus::Draft);
        assert_eq!(adjustment.total_amount.amount(), dec!(80));
        assert_ne!(adjustment.claim_number, original.claim_number);
    }

    #[tokio::test]
    async fn test_related_claim_needs_submitted_original() {
        let h = Harness::new().await;
        let service = h.ready_service(dec!(2), None).await;
        let draft = h.draft_claim(vec![service.id]).await;

        let err = h
            .engine
            .lifecycle
            .create_related_claim(draft.id, ClaimType::Replacement, None, None, ACTOR)
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::InvalidRelatedClaim));
    }

    #[tokio::test]
    async fn test_settlement_requires_paid_claim() {
        let h = Harness::new().await;
        let claim = h.submitted_claim(1).await;

        let err = h.engine.lifecycle.settle_claim_services(claim.id, ACTOR).await.unwrap_err();

        assert_eq!(err.reason_code(), Some(ReasonCode::ClaimNotPaid));
    }
}

// ============================================================================
// Properties
// ============================================================================

fn update_for(status: ClaimStatus) -> ClaimStatusUpdate {
    match status {
        ClaimStatus::Validated => ClaimStatusUpdate::Validate,
        ClaimStatus::Submitted => Harness::submit(),
        ClaimStatus::Acknowledged => ClaimStatusUpdate::Acknowledge,
        ClaimStatus::Pending => ClaimStatusUpdate::MarkPending,
        ClaimStatus::Denied => ClaimStatusUpdate::Deny {
            reason: "CO-16".to_string(),
            detail: None,
            adjudication_date: DateFixtures::days_ago(1),
        },
        ClaimStatus::Appealed => ClaimStatusUpdate::Appeal,
        ClaimStatus::Void => ClaimStatusUpdate::Void { reason: "entered in error".to_string() },
        ClaimStatus::Draft | ClaimStatus::Paid => {
            unreachable!("{status} is not reached by an update")
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any walk along the lifecycle graph is accepted and recorded as a legal history
    #[test]
    fn lifecycle_walks_record_legal_history(path in claim_path_strategy(8)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let h = Harness::new().await;
            let service = h.ready_service(dec!(2), None).await;
            let mut claim = h.draft_claim(vec![service.id]).await;

            for status in path.iter().skip(1) {
                claim = h
                    .engine
                    .lifecycle
                    .update_status(claim.id, update_for(*status), ACTOR, None)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(claim.status, *status);
            }

            let history = h.engine.lifecycle.claim_history(claim.id).await.unwrap();
            assert_history_is_legal_path(&history);
            assert_history_statuses(&history, &path);
            Ok(())
        })?;
    }
}
