//! Integration tests for domain_billing

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal_macros::dec;

use core_kernel::{ClaimId, ClientId, DateRange, Money, ProgramId};
use domain_billing::{
    check_readiness, Authorization, BillingError, BillingRules, BillingStatus, DocumentType,
    DocumentationStatus, ReadinessInput, Service, ServiceCategory, ServiceDocument, ServiceType,
};

// ============================================================================
// Billing status graph
// ============================================================================

mod status_graph {
    use super::*;

    #[test]
    fn test_full_happy_path() {
        use BillingStatus::*;
        for (from, to) in [
            (Unbilled, ReadyForBilling),
            (ReadyForBilling, InClaim),
            (InClaim, Billed),
            (Billed, Paid),
            (Paid, Void),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to}");
        }
    }

    #[test]
    fn test_denial_and_rebill() {
        use BillingStatus::*;
        assert!(Billed.can_transition_to(Denied));
        assert!(Denied.can_transition_to(ReadyForBilling));
        assert!(!Denied.can_transition_to(InClaim));
        assert!(!Paid.can_transition_to(Denied));
    }

    #[test]
    fn test_every_status_can_be_voided_except_void() {
        for status in BillingStatus::ALL {
            assert_eq!(
                status.can_transition_to(BillingStatus::Void),
                status != BillingStatus::Void
            );
        }
    }

    #[test]
    fn test_no_self_loops() {
        for status in BillingStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }
}

// ============================================================================
// Service lifecycle
// ============================================================================

mod service_lifecycle {
    use super::*;

    fn ready_service() -> (ServiceType, Service) {
        let st =
            ServiceType::new("H2019", "Therapeutic behavioral services", ServiceCategory::General);
        let mut s = Service::new(
            ClientId::new(),
            &st,
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            dec!(4),
            Money::usd(dec!(18.75)),
        )
        .unwrap();
        s.transition_to(BillingStatus::ReadyForBilling).unwrap();
        (st, s)
    }

    #[test]
    fn test_claim_assignment() {
        let (_, mut s) = ready_service();
        let claim = ClaimId::new();
        s.assign_to_claim(claim).unwrap();
        assert_eq!(s.billing_status, BillingStatus::InClaim);
        assert_eq!(s.claim_id, Some(claim));
        assert_eq!(s.amount.amount(), dec!(75.00));
    }

    #[test]
    fn test_cannot_assign_unbilled_service() {
        let st = ServiceType::new("X", "x", ServiceCategory::General);
        let mut s = Service::new(
            ClientId::new(),
            &st,
            Utc::now().date_naive(),
            dec!(1),
            Money::usd(dec!(1)),
        )
        .unwrap();
        assert!(matches!(
            s.assign_to_claim(ClaimId::new()),
            Err(BillingError::InvalidTransition { .. })
        ));
        assert!(s.claim_id.is_none());
    }

    #[test]
    fn test_documents_locked_after_billing() {
        let (st, mut s) = ready_service();
        s.assign_to_claim(ClaimId::new()).unwrap();
        s.transition_to(BillingStatus::Billed).unwrap();

        let now = Utc::now();
        let result = s.attach_document(
            ServiceDocument::signed(DocumentType::ProgressNote, "late note", "RN Hale", now),
            st.category,
            now,
        );
        assert!(matches!(
            result,
            Err(BillingError::ServiceLocked { status: BillingStatus::Billed })
        ));
        assert_eq!(s.documentation_status, DocumentationStatus::Incomplete);
    }
}

// ============================================================================
// Readiness end to end
// ============================================================================

mod readiness {
    use super::*;

    #[test]
    fn test_reserved_service_passes_against_its_authorization() {
        let now = Utc::now();
        let today = now.date_naive();
        let st = ServiceType::new("97153", "Adaptive behavior treatment", ServiceCategory::Therapy);
        let mut s = Service::new(
            ClientId::new(),
            &st,
            today - Duration::days(2),
            dec!(2),
            Money::usd(dec!(50)),
        )
        .unwrap();
        for doc_type in [DocumentType::ProgressNote, DocumentType::Assessment] {
            s.attach_document(
                ServiceDocument::signed(doc_type, "signed", "Dr. Park", now - Duration::minutes(5)),
                st.category,
                now,
            )
            .unwrap();
        }

        let mut auth = Authorization::new(
            s.client_id,
            ProgramId::new(),
            st.id,
            dec!(20),
            DateRange::new(today - Duration::days(30), today + Duration::days(30)).unwrap(),
        )
        .unwrap();
        auth.reserve(s.units).unwrap();
        s.authorization_id = Some(auth.id);
        s.reserved_units = s.units;

        let result = check_readiness(
            &BillingRules::default(),
            ReadinessInput {
                service: &s,
                service_type: &st,
                authorization: Some(&auth),
                duplicate_count: 0,
                today,
                now,
            },
        );
        assert!(result.is_valid, "{:?}", result.errors);
    }
}
