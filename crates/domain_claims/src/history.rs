//! Claim status history
//!
//! The history is append-only. Undoing a payment does not remove the PAID
//! entry; it appends a REVERSAL entry that returns the claim to the status
//! recorded before PAID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ClaimId, StatusHistoryId};
use crate::claim::ClaimStatus;

/// Kind of history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEntryKind {
    /// A move along the lifecycle graph
    Transition,
    /// Undo of the PAID entry directly before it
    Reversal,
}

impl HistoryEntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryEntryKind::Transition => "TRANSITION",
            HistoryEntryKind::Reversal => "REVERSAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TRANSITION" => Some(HistoryEntryKind::Transition),
            "REVERSAL" => Some(HistoryEntryKind::Reversal),
            _ => None,
        }
    }
}

/// One row of a claim's audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimStatusHistoryEntry {
    pub id: StatusHistoryId,
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    /// `None` only on the creation entry
    pub previous_status: Option<ClaimStatus>,
    pub kind: HistoryEntryKind,
    pub actor: String,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl ClaimStatusHistoryEntry {
    /// Entry written when a claim is created in DRAFT
    pub fn created(claim_id: ClaimId, actor: impl Into<String>, notes: Option<String>) -> Self {
        Self::build(claim_id, ClaimStatus::Draft, None, HistoryEntryKind::Transition, actor, notes)
    }

    pub fn transition(
        claim_id: ClaimId,
        from: ClaimStatus,
        to: ClaimStatus,
        actor: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self::build(claim_id, to, Some(from), HistoryEntryKind::Transition, actor, notes)
    }

    pub fn reversal(
        claim_id: ClaimId,
        restored: ClaimStatus,
        actor: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self::build(
            claim_id,
            restored,
            Some(ClaimStatus::Paid),
            HistoryEntryKind::Reversal,
            actor,
            notes,
        )
    }

    fn build(
        claim_id: ClaimId,
        status: ClaimStatus,
        previous_status: Option<ClaimStatus>,
        kind: HistoryEntryKind,
        actor: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: StatusHistoryId::new_v7(),
            claim_id,
            status,
            previous_status,
            kind,
            actor: actor.into(),
            notes,
            changed_at: Utc::now(),
        }
    }
}

/// Status a PAID claim held before its most recent PAID entry
pub fn status_before_paid(history: &[ClaimStatusHistoryEntry]) -> Option<ClaimStatus> {
    history
        .iter()
        .rev()
        .find(|e| e.status == ClaimStatus::Paid && e.kind == HistoryEntryKind::Transition)
        .and_then(|e| e.previous_status)
}

/// Why a history is not a legal path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryViolation {
    pub index: usize,
    pub reason: String,
}

impl fmt::Display for HistoryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "history entry {}: {}", self.index, self.reason)
    }
}

/// Checks that `history` is a legal walk through the lifecycle graph
pub fn check_history(history: &[ClaimStatusHistoryEntry]) -> Result<(), HistoryViolation> {
    let violation = |index: usize, reason: String| Err(HistoryViolation { index, reason });

    let Some(first) = history.first() else {
        return Ok(());
    };
    if first.status != ClaimStatus::Draft || first.previous_status.is_some() {
        return violation(0, format!("starts at {} instead of DRAFT", first.status));
    }

    for (index, pair) in history.windows(2).enumerate() {
        let (prior, entry) = (&pair[0], &pair[1]);
        let index = index + 1;
        if entry.claim_id != prior.claim_id {
            return violation(index, "belongs to another claim".to_string());
        }
        if entry.changed_at < prior.changed_at {
            return violation(index, "is older than the entry before it".to_string());
        }
        if entry.previous_status != Some(prior.status) {
            return violation(
                index,
                format!(
                    "previous status {:?} does not match {}",
                    entry.previous_status, prior.status
                ),
            );
        }
        match entry.kind {
            HistoryEntryKind::Transition => {
                if !prior.status.can_transition_to(entry.status) {
                    return violation(
                        index,
                        format!("{} -> {} is not a lifecycle edge", prior.status, entry.status),
                    );
                }
            }
            HistoryEntryKind::Reversal => {
                if prior.status != ClaimStatus::Paid
                    || prior.previous_status != Some(entry.status)
                {
                    return violation(
                        index,
                        format!(
                            "reversal to {} does not undo the PAID entry before it",
                            entry.status
                        ),
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(steps: &[ClaimStatus]) -> Vec<ClaimStatusHistoryEntry> {
        let id = ClaimId::new();
        let mut history = vec![ClaimStatusHistoryEntry::created(id, "system", None)];
        for step in steps {
            let from = history.last().map(|e| e.status).unwrap();
            history.push(ClaimStatusHistoryEntry::transition(id, from, *step, "biller", None));
        }
        history
    }

    #[test]
    fn test_forward_path_is_legal() {
        use ClaimStatus::*;
        let history =
            walk(&[Validated, Submitted, Acknowledged, Pending, Denied, Appealed, Pending, Paid]);
        assert!(check_history(&history).is_ok());
    }

    #[test]
    fn test_skipping_states_is_illegal() {
        use ClaimStatus::*;
        let history = walk(&[Submitted, Denied]);
        let err = check_history(&history).unwrap_err();
        assert_eq!(err.index, 2);
    }

    #[test]
    fn test_reversal_must_restore_prior_status() {
        use ClaimStatus::*;
        let mut history = walk(&[Submitted, Paid]);
        let id = history[0].claim_id;

        let mut bad = history.clone();
        bad.push(ClaimStatusHistoryEntry::reversal(id, Pending, "biller", None));
        assert!(check_history(&bad).is_err());

        history.push(ClaimStatusHistoryEntry::reversal(id, Submitted, "biller", None));
        assert!(check_history(&history).is_ok());

        // paid again after the reversal
        history.push(ClaimStatusHistoryEntry::transition(id, Submitted, Paid, "biller", None));
        assert!(check_history(&history).is_ok());
        assert_eq!(status_before_paid(&history), Some(Submitted));
    }

    #[test]
    fn test_status_before_paid() {
        use ClaimStatus::*;
        let history = walk(&[Submitted, Acknowledged, Pending, Paid]);
        assert_eq!(status_before_paid(&history), Some(Pending));
        assert_eq!(status_before_paid(&walk(&[Submitted])), None);
    }

    #[test]
    fn test_must_start_in_draft() {
        let id = ClaimId::new();
        let history = vec![ClaimStatusHistoryEntry::transition(
            id,
            ClaimStatus::Draft,
            ClaimStatus::Submitted,
            "x",
            None,
        )];
        assert_eq!(check_history(&history).unwrap_err().index, 0);
    }
}
