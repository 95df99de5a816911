//! Custom Test Assertions
//!
//! Assertion helpers for domain types that give more meaningful failure
//! messages than plain `assert_eq!`.

use rust_decimal::Decimal;

use core_kernel::Money;
use domain_billing::Authorization;
use domain_claims::{check_history, ClaimStatus, ClaimStatusHistoryEntry};

/// Asserts that a Money value equals an amount to the cent
pub fn assert_money_eq(actual: &Money, expected: Decimal) {
    assert!(
        actual.amount().round_dp(2) == expected.round_dp(2),
        "Expected {} {}, got {}",
        actual.currency().symbol(),
        expected,
        actual
    );
}

/// Asserts that money values sum to a total
pub fn assert_money_sum(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts.iter()).expect("parts share the total's currency");
    assert!(
        sum.settles(total),
        "Parts sum to {}, expected {}",
        sum,
        total
    );
}

/// Asserts the authorization ledger invariant `0 <= used <= authorized`
pub fn assert_authorization_within_bounds(authorization: &Authorization) {
    assert!(
        authorization.used_units >= Decimal::ZERO
            && authorization.used_units <= authorization.authorized_units,
        "Authorization {} has {} used of {} authorized",
        authorization.id,
        authorization.used_units,
        authorization.authorized_units
    );
}

/// Asserts that a history is a legal path through the claim lifecycle
pub fn assert_history_is_legal_path(history: &[ClaimStatusHistoryEntry]) {
    if let Err(violation) = check_history(history) {
        let path: Vec<&str> = history.iter().map(|e| e.status.as_str()).collect();
        panic!(
            "Illegal claim history at entry {}: {} (path: {})",
            violation.index,
            violation.reason,
            path.join(" -> ")
        );
    }
}

/// Asserts the sequence of statuses recorded in a history
pub fn assert_history_statuses(history: &[ClaimStatusHistoryEntry], expected: &[ClaimStatus]) {
    let actual: Vec<ClaimStatus> = history.iter().map(|e| e.status).collect();
    assert_eq!(actual, expected, "Unexpected claim history");
}
