//! Payment reconciliation
//!
//! Applies payments to claims. A reconciliation is validated as a whole
//! before anything is written:
//!
//! - missing payment or claim, foreign payer, non-positive amounts and
//!   over-allocation of either the payment or a claim reject the request
//! - a claim whose status cannot take a payment is skipped and reported,
//!   the remaining matches still apply
//!
//! A claim whose cumulative payments reach its total moves to PAID through
//! the claim lifecycle. Payment status and claim adjustment codes are always
//! re-derived from the stored claim payments, never patched in place.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use core_kernel::{ClaimId, ClaimPaymentId, Currency, Money, PayerId, PaymentId};
use domain_billing::BillingStatus;
use domain_claims::{Claim, ClaimStatus, ClaimStatusUpdate};
use domain_payment::{
    derive_adjustment_codes, plan_auto_allocation, rank_candidates, total_paid, ClaimPayment,
    MatchCandidate, MatchSuggestion, Payment, PaymentAdjustment, PaymentMethod,
    ReconciliationStatus, RemittanceAdvice,
};

use crate::batch::BatchOutcome;
use crate::context::{EngineContext, UnitOfWork};
use crate::error::{ReasonCode, RevenueError};
use crate::events::LifecycleEvent;
use crate::lifecycle::ClaimLifecycle;

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut error = ValidationError::new("positive");
        error.message = Some("must be greater than zero".into());
        return Err(error);
    }
    Ok(())
}

/// A payment as received
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPayment {
    pub payer_id: PayerId,
    /// Amount in USD
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    #[validate(length(max = 100))]
    pub reference_number: Option<String>,
    #[validate(length(max = 500))]
    pub remittance_file: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Part of a payment to apply to one claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimMatch {
    pub claim_id: ClaimId,
    pub amount: Decimal,
    #[serde(default)]
    pub adjustments: Vec<PaymentAdjustment>,
}

impl ClaimMatch {
    pub fn new(claim_id: ClaimId, amount: Decimal) -> Self {
        Self {
            claim_id,
            amount,
            adjustments: Vec::new(),
        }
    }

    pub fn with_adjustment(mut self, adjustment: PaymentAdjustment) -> Self {
        self.adjustments.push(adjustment);
        self
    }
}

/// One entry of a batch reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub payment_id: PaymentId,
    pub matches: Vec<ClaimMatch>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedMatch {
    pub claim_id: ClaimId,
    pub claim_payment_id: ClaimPaymentId,
    pub amount: Money,
    /// Claim status after the reconciliation
    pub claim_status: ClaimStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedMatch {
    pub claim_id: ClaimId,
    pub claim_status: ClaimStatus,
    pub code: ReasonCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub payment_id: PaymentId,
    pub applied: Vec<AppliedMatch>,
    pub rejected: Vec<RejectedMatch>,
    /// Claims that reached PAID in this reconciliation
    pub paid_claims: Vec<ClaimId>,
    pub allocated: Money,
    pub unallocated: Money,
    pub status: ReconciliationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimReversal {
    pub claim_id: ClaimId,
    pub restored: ClaimStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UndoResult {
    pub payment_id: PaymentId,
    /// Claim payments deleted
    pub removed: u64,
    pub reversed: Vec<ClaimReversal>,
    pub status: ReconciliationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemittanceResult {
    pub payment_id: PaymentId,
    pub reconciliation: Option<ReconciliationResult>,
    /// Claims denied by zero-paid lines
    pub denied: Vec<ClaimId>,
    /// Claim references that matched no claim
    pub unmatched: Vec<String>,
    /// Lines that were neither applied nor denied
    pub skipped: Vec<String>,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    ctx: EngineContext,
    lifecycle: ClaimLifecycle,
}

impl ReconciliationEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            lifecycle: ClaimLifecycle::new(ctx.clone()),
            ctx,
        }
    }

    // ========================================================================
    // Payments
    // ========================================================================

    #[instrument(skip(self, new), fields(payer_id = %new.payer_id, amount = %new.amount))]
    pub async fn record_payment(
        &self,
        new: NewPayment,
        actor: &str,
    ) -> Result<Payment, RevenueError> {
        let (payment, events) = self
            .ctx
            .bounded("record_payment", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.record_payment_in(&mut uow, new, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(payment)
    }

    pub async fn record_payment_in(
        &self,
        uow: &mut UnitOfWork,
        new: NewPayment,
        actor: &str,
    ) -> Result<Payment, RevenueError> {
        new.validate()?;
        let payer = self.ctx.directory.get_payer(new.payer_id).await?;
        if !payer.is_active() {
            return Err(RevenueError::business(
                ReasonCode::PartyInactive,
                format!("payer {} is {}", new.payer_id, payer.status.as_str()),
            ));
        }

        let mut payment =
            Payment::new(new.payer_id, Money::usd(new.amount), new.method, new.payment_date)?;
        payment.reference_number = new.reference_number;
        payment.remittance_file = new.remittance_file;
        payment.notes = new.notes;

        uow.tx().insert_payment(&payment).await?;
        uow.record(LifecycleEvent::PaymentRecorded { payment_id: payment.id });
        info!(payment_id = %payment.id, amount = %payment.amount, actor, "payment recorded");
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, RevenueError> {
        self.ctx
            .read("get_payment", move || async move {
                let mut uow = self.ctx.begin().await?;
                let found = uow.tx().load_payment(payment_id).await;
                uow.rollback().await;
                found?.ok_or_else(|| RevenueError::not_found("Payment", payment_id))
            })
            .await
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    #[instrument(skip(self, matches, notes), fields(matches = matches.len()))]
    pub async fn reconcile(
        &self,
        payment_id: PaymentId,
        matches: Vec<ClaimMatch>,
        notes: Option<String>,
        actor: &str,
    ) -> Result<ReconciliationResult, RevenueError> {
        let (result, events) = self
            .ctx
            .bounded("reconcile_payment", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.reconcile_in(&mut uow, payment_id, matches, notes, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(result)
    }

    /// Reconciles each payment independently
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn batch_reconcile(
        &self,
        requests: Vec<ReconcileRequest>,
        actor: &str,
    ) -> BatchOutcome<ReconciliationResult> {
        let mut outcome = BatchOutcome::default();
        for (index, request) in requests.into_iter().enumerate() {
            let reference = request.payment_id.to_string();
            let result =
                self.reconcile(request.payment_id, request.matches, request.notes, actor).await;
            outcome.push(index, reference, result);
        }
        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "batch reconciliation finished"
        );
        outcome
    }

    pub async fn reconcile_in(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
        matches: Vec<ClaimMatch>,
        notes: Option<String>,
        actor: &str,
    ) -> Result<ReconciliationResult, RevenueError> {
        if matches.is_empty() {
            return Err(RevenueError::validation("matches", "at least one claim match is required"));
        }
        for (index, m) in matches.iter().enumerate() {
            if m.amount <= Decimal::ZERO {
                return Err(RevenueError::validation(
                    format!("matches[{}].amount", index),
                    format!("amount must be greater than zero, got {}", m.amount),
                ));
            }
        }

        let mut payment = self.lock_payment(uow, payment_id).await?;
        let currency = payment.amount.currency();

        let mut claims: Vec<Claim> = Vec::new();
        for m in &matches {
            if claims.iter().any(|c| c.id == m.claim_id) {
                continue;
            }
            let claim = self.lock_claim(uow, m.claim_id).await?;
            if claim.payer_id != payment.payer_id {
                return Err(RevenueError::business(
                    ReasonCode::PayerMismatch,
                    format!("claim {} belongs to another payer", claim.claim_number),
                ));
            }
            claims.push(claim);
        }

        let mut rejected = Vec::new();
        for claim in claims.iter().filter(|c| !c.status.can_receive_payment()) {
            warn!(
                claim_id = %claim.id,
                status = %claim.status,
                %payment_id,
                "claim cannot receive payment"
            );
            rejected.push(RejectedMatch {
                claim_id: claim.id,
                claim_status: claim.status,
                code: ReasonCode::ClaimNotPayable,
                message: format!(
                    "claim {} is {} and cannot receive payment",
                    claim.claim_number, claim.status
                ),
            });
        }
        let accepted: Vec<&ClaimMatch> = matches
            .iter()
            .filter(|m| rejected.iter().all(|r| r.claim_id != m.claim_id))
            .collect();

        self.check_payment_capacity(uow, &payment, &accepted).await?;
        for claim in claims.iter().filter(|c| c.status.can_receive_payment()) {
            self.check_claim_capacity(uow, claim, &accepted).await?;
        }

        let mut inserted = Vec::with_capacity(accepted.len());
        for m in &accepted {
            let claim_payment = ClaimPayment::new(
                payment_id,
                m.claim_id,
                Money::new(m.amount, currency),
                m.adjustments.clone(),
            );
            uow.tx().insert_claim_payment(&claim_payment).await?;
            inserted.push(claim_payment);
        }

        let mut paid_claims = Vec::new();
        for claim in claims.iter_mut().filter(|c| c.status.can_receive_payment()) {
            let payments = uow.tx().claim_payments_for_claim(claim.id).await?;
            let paid = total_paid(claim.total_amount.currency(), &payments)?;
            claim.set_adjustment_codes(derive_adjustment_codes(&payments));
            if paid.settles(&claim.total_amount) {
                self.lifecycle.mark_paid_in(uow, claim, actor, notes.clone()).await?;
                paid_claims.push(claim.id);
            } else {
                uow.tx().update_claim(claim).await?;
            }
        }

        let allocated =
            total_paid(currency, &uow.tx().claim_payments_for_payment(payment_id).await?)?;
        let status = if inserted.is_empty() {
            payment.reconciliation_status
        } else {
            let status = payment.refresh_status(&allocated)?;
            uow.tx().update_payment(&payment).await?;
            uow.record(LifecycleEvent::PaymentReconciled { payment_id, status });
            status
        };

        let applied = inserted
            .into_iter()
            .map(|cp| AppliedMatch {
                claim_status: claims
                    .iter()
                    .find(|c| c.id == cp.claim_id)
                    .map(|c| c.status)
                    .unwrap_or(ClaimStatus::Paid),
                claim_id: cp.claim_id,
                claim_payment_id: cp.id,
                amount: cp.paid_amount,
            })
            .collect::<Vec<_>>();

        info!(
            %payment_id,
            applied = applied.len(),
            rejected = rejected.len(),
            paid = paid_claims.len(),
            status = status.as_str(),
            actor,
            "payment reconciled"
        );
        Ok(ReconciliationResult {
            payment_id,
            applied,
            rejected,
            paid_claims,
            unallocated: payment.unallocated(&allocated)?,
            allocated,
            status,
        })
    }

    /// Claims of the payment's payer that could absorb it, ranked
    #[instrument(skip(self))]
    pub async fn suggest_matches(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<MatchSuggestion>, RevenueError> {
        let tolerance = self.ctx.config.reconciliation.match_tolerance_percent;
        self.ctx
            .read("suggest_matches", move || async move {
                let mut uow = self.ctx.begin().await?;
                let result = self.suggest_in(&mut uow, payment_id, tolerance).await;
                uow.rollback().await;
                result
            })
            .await
    }

    async fn suggest_in(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
        tolerance: Decimal,
    ) -> Result<Vec<MatchSuggestion>, RevenueError> {
        let payment = uow
            .tx()
            .load_payment(payment_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Payment", payment_id))?;
        let candidates = self.candidates(uow, &payment).await?;
        Ok(rank_candidates(&payment.amount, candidates, tolerance))
    }

    /// Allocates the payment's unallocated amount without a manual match list
    ///
    /// Fails with `no-usable-match`, writing nothing, when the candidates
    /// cannot absorb the whole amount.
    #[instrument(skip(self))]
    pub async fn auto_reconcile(
        &self,
        payment_id: PaymentId,
        actor: &str,
    ) -> Result<ReconciliationResult, RevenueError> {
        let (result, events) = self
            .ctx
            .bounded("auto_reconcile", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.auto_reconcile_in(&mut uow, payment_id, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(result)
    }

    pub async fn auto_reconcile_in(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
        actor: &str,
    ) -> Result<ReconciliationResult, RevenueError> {
        let payment = self.lock_payment(uow, payment_id).await?;
        let allocated = total_paid(
            payment.amount.currency(),
            &uow.tx().claim_payments_for_payment(payment_id).await?,
        )?;
        let unallocated = payment.unallocated(&allocated)?;
        if !unallocated.round_to_currency().is_positive() {
            return Err(RevenueError::business(
                ReasonCode::PaymentAlreadyReconciled,
                format!("payment {} has nothing left to allocate", payment_id),
            ));
        }

        let candidates = self.candidates(uow, &payment).await?;
        let plan = plan_auto_allocation(&unallocated, &candidates).map_err(|e| {
            warn!(
                %payment_id,
                candidates = candidates.len(),
                error = %e,
                "auto reconciliation found no usable match"
            );
            RevenueError::from(e)
        })?;

        let matches = plan
            .into_iter()
            .map(|allocation| ClaimMatch::new(allocation.claim_id, allocation.amount.amount()))
            .collect();
        self.reconcile_in(uow, payment_id, matches, Some("auto-reconciled".to_string()), actor)
            .await
    }

    // ========================================================================
    // Undo
    // ========================================================================

    /// Removes every allocation of a payment and reverses claims it paid
    #[instrument(skip(self, notes))]
    pub async fn undo_reconciliation(
        &self,
        payment_id: PaymentId,
        notes: Option<String>,
        actor: &str,
    ) -> Result<UndoResult, RevenueError> {
        let (result, events) = self
            .ctx
            .bounded("undo_reconciliation", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.undo_reconciliation_in(&mut uow, payment_id, notes, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(result)
    }

    pub async fn undo_reconciliation_in(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
        notes: Option<String>,
        actor: &str,
    ) -> Result<UndoResult, RevenueError> {
        let mut payment = self.lock_payment(uow, payment_id).await?;
        let claim_payments = uow.tx().claim_payments_for_payment(payment_id).await?;

        let mut claims: Vec<Claim> = Vec::new();
        for cp in &claim_payments {
            if claims.iter().any(|c| c.id == cp.claim_id) {
                continue;
            }
            let claim = self.lock_claim(uow, cp.claim_id).await?;
            if claim.status == ClaimStatus::Paid {
                let services = uow.tx().services_for_claim(claim.id).await?;
                if services.iter().any(|s| s.billing_status == BillingStatus::Paid) {
                    return Err(RevenueError::business(
                        ReasonCode::ClaimServicesSettled,
                        format!(
                            "services of claim {} were already settled as PAID",
                            claim.claim_number
                        ),
                    ));
                }
            }
            claims.push(claim);
        }

        let removed = uow.tx().delete_claim_payments_for_payment(payment_id).await?;

        let mut reversed = Vec::new();
        for mut claim in claims {
            let remaining = uow.tx().claim_payments_for_claim(claim.id).await?;
            let paid = total_paid(claim.total_amount.currency(), &remaining)?;
            claim.set_adjustment_codes(derive_adjustment_codes(&remaining));
            if claim.status == ClaimStatus::Paid && !paid.settles(&claim.total_amount) {
                let restored =
                    self.lifecycle.revert_paid_in(uow, &mut claim, actor, notes.clone()).await?;
                reversed.push(ClaimReversal {
                    claim_id: claim.id,
                    restored,
                });
            } else {
                uow.tx().update_claim(&claim).await?;
            }
        }

        let allocated = total_paid(
            payment.amount.currency(),
            &uow.tx().claim_payments_for_payment(payment_id).await?,
        )?;
        let status = payment.refresh_status(&allocated)?;
        uow.tx().update_payment(&payment).await?;
        uow.record(LifecycleEvent::ReconciliationUndone { payment_id });
        info!(%payment_id, removed, reversed = reversed.len(), actor, "reconciliation undone");

        Ok(UndoResult {
            payment_id,
            removed,
            reversed,
            status,
        })
    }

    // ========================================================================
    // Remittance
    // ========================================================================

    /// Applies a parsed remittance to a recorded payment in one transaction
    ///
    /// Paid lines are reconciled, zero-paid lines carrying adjustments deny
    /// their claim. Unknown claim numbers are reported, not fatal.
    #[instrument(skip(self, advice), fields(lines = advice.lines.len()))]
    pub async fn apply_remittance(
        &self,
        payment_id: PaymentId,
        advice: RemittanceAdvice,
        actor: &str,
    ) -> Result<RemittanceResult, RevenueError> {
        let (result, events) = self
            .ctx
            .bounded("apply_remittance", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.apply_remittance_in(&mut uow, payment_id, advice, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(result)
    }

    pub async fn apply_remittance_in(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
        advice: RemittanceAdvice,
        actor: &str,
    ) -> Result<RemittanceResult, RevenueError> {
        advice.validate()?;
        let payment = self.lock_payment(uow, payment_id).await?;
        if advice.payer_id != payment.payer_id {
            return Err(RevenueError::business(
                ReasonCode::PayerMismatch,
                format!(
                    "remittance payer {} does not match payment payer {}",
                    advice.payer_id, payment.payer_id
                ),
            ));
        }
        let adjudication_date = advice.payment_date.unwrap_or(payment.payment_date);
        let note = advice
            .payment_reference
            .as_ref()
            .map(|reference| format!("remittance {}", reference));

        let mut result = RemittanceResult {
            payment_id,
            reconciliation: None,
            denied: Vec::new(),
            unmatched: Vec::new(),
            skipped: Vec::new(),
        };
        let mut matches = Vec::new();

        for line in &advice.lines {
            let Some(claim) = uow.tx().find_claim_by_number(&line.claim_ref).await? else {
                warn!(claim_ref = %line.claim_ref, %payment_id, "remittance line matches no claim");
                result.unmatched.push(line.claim_ref.clone());
                continue;
            };

            if line.is_denial() {
                if !claim.status.can_transition_to(ClaimStatus::Denied) {
                    warn!(
                        claim_ref = %line.claim_ref,
                        status = %claim.status,
                        "denial line for a claim that cannot be denied"
                    );
                    result.skipped.push(line.claim_ref.clone());
                    continue;
                }
                let descriptions: Vec<&str> = line
                    .adjustments
                    .iter()
                    .filter_map(|a| a.description.as_deref())
                    .collect();
                let update = ClaimStatusUpdate::Deny {
                    reason: line.denial_reason(),
                    detail: (!descriptions.is_empty()).then(|| descriptions.join("; ")),
                    adjudication_date,
                };
                self.lifecycle
                    .update_status_in(uow, claim.id, update, actor, note.clone())
                    .await?;
                result.denied.push(claim.id);
            } else if line.amount > Decimal::ZERO {
                matches.push(ClaimMatch {
                    claim_id: claim.id,
                    amount: line.amount,
                    adjustments: line.adjustments.clone(),
                });
            } else {
                result.skipped.push(line.claim_ref.clone());
            }
        }

        if !matches.is_empty() {
            result.reconciliation =
                Some(self.reconcile_in(uow, payment_id, matches, note, actor).await?);
        }
        info!(
            %payment_id,
            denied = result.denied.len(),
            unmatched = result.unmatched.len(),
            skipped = result.skipped.len(),
            actor,
            "remittance applied"
        );
        Ok(result)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn candidates(
        &self,
        uow: &mut UnitOfWork,
        payment: &Payment,
    ) -> Result<Vec<MatchCandidate>, RevenueError> {
        let claims = uow
            .tx()
            .claims_for_payer(payment.payer_id, &[ClaimStatus::Submitted, ClaimStatus::Pending])
            .await?;
        let mut candidates = Vec::with_capacity(claims.len());
        for claim in claims {
            let payments = uow.tx().claim_payments_for_claim(claim.id).await?;
            let paid = total_paid(claim.total_amount.currency(), &payments)?;
            candidates.push(MatchCandidate {
                outstanding: claim.total_amount.checked_sub(&paid)?,
                claim_id: claim.id,
                claim_number: claim.claim_number,
                status: claim.status,
                total: claim.total_amount,
                submission_date: claim.submission_date,
            });
        }
        Ok(candidates)
    }

    async fn check_payment_capacity(
        &self,
        uow: &mut UnitOfWork,
        payment: &Payment,
        accepted: &[&ClaimMatch],
    ) -> Result<(), RevenueError> {
        let currency = payment.amount.currency();
        let already =
            total_paid(currency, &uow.tx().claim_payments_for_payment(payment.id).await?)?;
        let requested = sum_matches(currency, accepted.iter().copied())?;
        let after = already.checked_add(&requested)?;
        if after > payment.amount && !after.settles(&payment.amount) {
            return Err(RevenueError::business(
                ReasonCode::PaymentAmountExceeded,
                format!(
                    "allocating {} exceeds the {} left on payment {}",
                    requested,
                    payment.unallocated(&already)?,
                    payment.id
                ),
            ));
        }
        Ok(())
    }

    async fn check_claim_capacity(
        &self,
        uow: &mut UnitOfWork,
        claim: &Claim,
        accepted: &[&ClaimMatch],
    ) -> Result<(), RevenueError> {
        let currency = claim.total_amount.currency();
        let prior = total_paid(currency, &uow.tx().claim_payments_for_claim(claim.id).await?)?;
        let requested =
            sum_matches(currency, accepted.iter().copied().filter(|m| m.claim_id == claim.id))?;
        let cumulative = prior.checked_add(&requested)?;
        if cumulative > claim.total_amount && !cumulative.settles(&claim.total_amount) {
            return Err(RevenueError::business(
                ReasonCode::ClaimAmountExceeded,
                format!(
                    "payments of {} would exceed claim {} total {}",
                    cumulative, claim.claim_number, claim.total_amount
                ),
            ));
        }
        Ok(())
    }

    async fn lock_payment(
        &self,
        uow: &mut UnitOfWork,
        payment_id: PaymentId,
    ) -> Result<Payment, RevenueError> {
        uow.tx()
            .load_payment(payment_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Payment", payment_id))
    }

    async fn lock_claim(
        &self,
        uow: &mut UnitOfWork,
        claim_id: ClaimId,
    ) -> Result<Claim, RevenueError> {
        uow.tx()
            .load_claim(claim_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Claim", claim_id))
    }
}

fn sum_matches<'a>(
    currency: Currency,
    matches: impl Iterator<Item = &'a ClaimMatch>,
) -> Result<Money, RevenueError> {
    let amounts: Vec<Money> = matches.map(|m| Money::new(m.amount, currency)).collect();
    Ok(Money::sum(currency, amounts.iter())?)
}
