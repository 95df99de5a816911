//! Payment-to-claim matching
//!
//! Two pure algorithms over candidate claims already filtered to the
//! payment's payer:
//!
//! - `rank_candidates` proposes claims whose total is close to the payment
//! - `plan_auto_allocation` picks claims whose outstanding balances absorb
//!   the whole payment
//!
//! Both are deterministic: ties always fall back to the oldest submission
//! date, then the claim number.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use core_kernel::{ClaimId, Money};
use domain_claims::ClaimStatus;
use crate::error::PaymentError;

/// A claim that could receive part of a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub claim_id: ClaimId,
    pub claim_number: String,
    pub status: ClaimStatus,
    pub total: Money,
    /// Total minus everything already paid
    pub outstanding: Money,
    pub submission_date: Option<NaiveDate>,
}

impl MatchCandidate {
    /// Only claims awaiting adjudication are matched automatically
    pub fn is_matchable(&self) -> bool {
        matches!(self.status, ClaimStatus::Submitted | ClaimStatus::Pending)
            && self.outstanding.is_positive()
    }
}

/// A ranked proposal returned by `rank_candidates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub claim_id: ClaimId,
    pub claim_number: String,
    pub status: ClaimStatus,
    pub total: Money,
    pub outstanding: Money,
    /// Claim total equals the payment amount
    pub exact: bool,
    /// Claim total minus payment amount
    pub difference: Money,
}

/// An amount to apply to one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub claim_id: ClaimId,
    pub amount: Money,
}

fn by_age(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    // Claims without a submission date sort last.
    match (a.submission_date, b.submission_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.claim_number.cmp(&b.claim_number))
}

/// Ranks candidates whose total lies within `tolerance_percent` of the payment
///
/// Exact matches come first, then larger totals, then claim number.
pub fn rank_candidates(
    payment_amount: &Money,
    candidates: Vec<MatchCandidate>,
    tolerance_percent: Decimal,
) -> Vec<MatchSuggestion> {
    let tolerance = payment_amount.percent(tolerance_percent).amount().abs();
    let mut suggestions: Vec<MatchSuggestion> = candidates
        .into_iter()
        .filter(|c| c.is_matchable() && c.total.currency() == payment_amount.currency())
        .filter_map(|c| {
            let difference = c.total.checked_sub(payment_amount).ok()?;
            if difference.amount().abs() > tolerance {
                return None;
            }
            Some(MatchSuggestion {
                exact: c.total.settles(payment_amount),
                claim_id: c.claim_id,
                claim_number: c.claim_number,
                status: c.status,
                total: c.total,
                outstanding: c.outstanding,
                difference,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.exact
            .cmp(&a.exact)
            .then_with(|| b.total.amount().cmp(&a.total.amount()))
            .then_with(|| a.claim_number.cmp(&b.claim_number))
    });
    suggestions
}

/// Plans an allocation that consumes the whole payment
///
/// A single claim whose outstanding balance equals the payment wins (the
/// oldest submission among several). Otherwise full outstanding balances are
/// taken oldest-submission-first, skipping claims larger than what is left.
/// Anything left over is a `NoUsableMatch`.
pub fn plan_auto_allocation(
    payment_amount: &Money,
    candidates: &[MatchCandidate],
) -> Result<Vec<Allocation>, PaymentError> {
    let mut eligible: Vec<&MatchCandidate> = candidates
        .iter()
        .filter(|c| c.is_matchable() && c.outstanding.currency() == payment_amount.currency())
        .collect();
    eligible.sort_by(|a, b| by_age(a, b));

    if let Some(exact) = eligible.iter().find(|c| c.outstanding.settles(payment_amount)) {
        return Ok(vec![Allocation {
            claim_id: exact.claim_id,
            amount: exact.outstanding,
        }]);
    }

    let mut remaining = *payment_amount;
    let mut allocations = Vec::new();
    for candidate in eligible {
        if remaining.round_to_currency().is_zero() {
            break;
        }
        if candidate.outstanding <= remaining {
            remaining = remaining.checked_sub(&candidate.outstanding)?;
            allocations.push(Allocation {
                claim_id: candidate.claim_id,
                amount: candidate.outstanding,
            });
        }
    }

    if !remaining.round_to_currency().is_zero() {
        return Err(PaymentError::NoUsableMatch { unallocated: remaining });
    }
    Ok(allocations)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn plan_never_exceeds_payment(
            payment in 1i64..100_000,
            totals in proptest::collection::vec(1i64..50_000, 0..12),
        ) {
            let amount = Money::from_minor(payment, core_kernel::Currency::USD);
            let candidates: Vec<MatchCandidate> = totals
                .iter()
                .enumerate()
                .map(|(i, t)| MatchCandidate {
                    claim_id: ClaimId::new(),
                    claim_number: format!("C-{i:03}"),
                    status: ClaimStatus::Pending,
                    total: Money::from_minor(*t, core_kernel::Currency::USD),
                    outstanding: Money::from_minor(*t, core_kernel::Currency::USD),
                    submission_date: None,
                })
                .collect();

            if let Ok(plan) = plan_auto_allocation(&amount, &candidates) {
                let sum: Decimal = plan.iter().map(|a| a.amount.amount()).sum();
                prop_assert_eq!(sum, amount.amount());
            }
        }
    }
}
