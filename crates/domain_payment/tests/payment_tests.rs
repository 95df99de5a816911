//! Integration tests for domain_payment

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use core_kernel::{ClaimId, Currency, Money, PayerId};
use domain_claims::ClaimStatus;
use domain_payment::{
    plan_auto_allocation, rank_candidates, total_paid, ClaimPayment, MatchCandidate, Payment,
    PaymentMethod, ReconciliationStatus,
};

fn candidate(number: &str, total: rust_decimal::Decimal, status: ClaimStatus) -> MatchCandidate {
    MatchCandidate {
        claim_id: ClaimId::new_v7(),
        claim_number: number.to_string(),
        status,
        total: Money::usd(total),
        outstanding: Money::usd(total),
        submission_date: NaiveDate::from_ymd_opt(2024, 6, 1),
    }
}

#[test]
fn test_planned_allocation_reconciles_payment() {
    let mut payment = Payment::new(
        PayerId::new_v7(),
        Money::usd(dec!(100.00)),
        PaymentMethod::Check,
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
    )
    .unwrap()
    .with_reference("CHK-10021");

    let plan = plan_auto_allocation(
        &payment.amount,
        &[
            candidate("CLM-A", dec!(40.00), ClaimStatus::Submitted),
            candidate("CLM-B", dec!(60.00), ClaimStatus::Pending),
        ],
    )
    .unwrap();

    let claim_payments: Vec<ClaimPayment> = plan
        .iter()
        .map(|a| ClaimPayment::new(payment.id, a.claim_id, a.amount, vec![]))
        .collect();
    let allocated = total_paid(Currency::USD, &claim_payments).unwrap();

    assert_eq!(payment.refresh_status(&allocated).unwrap(), ReconciliationStatus::Reconciled);
    assert_eq!(payment.reference_number.as_deref(), Some("CHK-10021"));
}

#[test]
fn test_suggestions_ignore_denied_and_paid() {
    let ranked = rank_candidates(
        &Money::usd(dec!(100)),
        vec![
            candidate("CLM-A", dec!(100), ClaimStatus::Denied),
            candidate("CLM-B", dec!(100), ClaimStatus::Paid),
            candidate("CLM-C", dec!(99), ClaimStatus::Pending),
        ],
        dec!(5),
    );
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].claim_number, "CLM-C");
    assert!(!ranked[0].exact);
}
