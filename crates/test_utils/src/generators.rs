//! Property-Based Test Generators
//!
//! Proptest strategies for generating test data that respects domain
//! invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;

use domain_claims::ClaimStatus;

/// Strategy for service units: quarter-unit steps from 0.25 to 40
pub fn units_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=160i64).prop_map(|quarters| Decimal::new(quarters * 25, 2))
}

/// Strategy for hourly rates in whole cents
pub fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for reservation sequences against one authorization
pub fn reservation_sequence_strategy() -> impl Strategy<Value = Vec<Decimal>> {
    proptest::collection::vec(units_strategy(), 1..20)
}

/// Splits `total_cents` into `1..=max_parts` positive parts summing to it
pub fn split_strategy(total_cents: i64, max_parts: usize) -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(1i64..1000i64, 1..=max_parts.max(1)).prop_map(move |weights| {
        let weight_sum: i64 = weights.iter().sum();
        let mut parts: Vec<i64> = weights.iter().map(|w| total_cents * w / weight_sum).collect();
        let assigned: i64 = parts.iter().sum();
        if let Some(last) = parts.last_mut() {
            *last += total_cents - assigned;
        }
        parts.retain(|p| *p > 0);
        parts
    })
}

/// A random walk along the claim lifecycle graph starting at DRAFT
///
/// Each step picks one of the current status's successors, so every
/// generated path is legal. PAID is never reached here.
pub fn claim_path_strategy(max_steps: usize) -> impl Strategy<Value = Vec<ClaimStatus>> {
    proptest::collection::vec(any::<prop::sample::Index>(), 0..=max_steps).prop_map(|choices| {
        let mut path = vec![ClaimStatus::Draft];
        for choice in choices {
            let current = *path.last().unwrap_or(&ClaimStatus::Draft);
            let successors: Vec<ClaimStatus> = ClaimStatus::ALL
                .iter()
                .copied()
                .filter(|s| *s != ClaimStatus::Paid && current.can_transition_to(*s))
                .collect();
            if successors.is_empty() {
                break;
            }
            path.push(*choice.get(&successors));
        }
        path
    })
}
