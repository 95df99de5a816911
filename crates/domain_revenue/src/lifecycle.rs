//! Claim lifecycle
//!
//! The single owner of claim status. Every accepted transition writes the
//! claim and one history entry in the same transaction; a rejected one
//! writes nothing. Status changes cascade onto the claim's services:
//!
//! | Claim becomes              | Services                                  |
//! |----------------------------|-------------------------------------------|
//! | SUBMITTED                  | IN_CLAIM → BILLED                         |
//! | DENIED                     | BILLED → DENIED                           |
//! | VOID before submission     | IN_CLAIM → READY_FOR_BILLING              |
//! | VOID after submission      | → VOID, reserved units released           |
//!
//! PAID is entered only from reconciliation, through `mark_paid_in`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument, warn};
use validator::Validate;

use core_kernel::{ClaimId, DateRange, Money, PayerId, ServiceId};
use domain_billing::{BillingStatus, Service};
use domain_claims::{
    status_before_paid, Claim, ClaimError, ClaimStatus, ClaimStatusHistoryEntry, ClaimStatusUpdate,
    ClaimType,
};

use crate::context::{EngineContext, UnitOfWork};
use crate::error::{ReasonCode, RevenueError};
use crate::events::{LifecycleEvent, Signal};
use crate::intake::ServiceIntake;
use crate::readiness::BillingReadinessValidator;

/// Request to bundle ready services into a new claim
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConvertRequest {
    pub payer_id: PayerId,
    #[validate(length(min = 1, message = "at least one service is required"))]
    pub service_ids: Vec<ServiceId>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Services flipped to PAID after their claim was paid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementResult {
    pub claim_id: ClaimId,
    pub settled: Vec<ServiceId>,
    /// Services left alone because they were not BILLED
    pub skipped: Vec<ServiceId>,
}

#[derive(Clone)]
pub struct ClaimLifecycle {
    ctx: EngineContext,
    readiness: BillingReadinessValidator,
    intake: ServiceIntake,
}

impl ClaimLifecycle {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            readiness: BillingReadinessValidator::new(ctx.clone()),
            intake: ServiceIntake::new(ctx.clone()),
            ctx,
        }
    }

    // ========================================================================
    // Claim creation
    // ========================================================================

    #[instrument(
        skip(self, request),
        fields(payer_id = %request.payer_id, services = request.service_ids.len())
    )]
    pub async fn convert_services_to_claim(
        &self,
        request: ConvertRequest,
        actor: &str,
    ) -> Result<Claim, RevenueError> {
        let (claim, events) = self
            .ctx
            .bounded("convert_services_to_claim", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.convert_services_to_claim_in(&mut uow, request, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(claim)
    }

    /// Creates a DRAFT claim from READY_FOR_BILLING services of one client
    ///
    /// Every service is re-validated under lock; any failure aborts the
    /// whole conversion.
    pub async fn convert_services_to_claim_in(
        &self,
        uow: &mut UnitOfWork,
        request: ConvertRequest,
        actor: &str,
    ) -> Result<Claim, RevenueError> {
        request.validate()?;
        let mut seen = HashSet::new();
        for service_id in &request.service_ids {
            if !seen.insert(*service_id) {
                return Err(RevenueError::validation(
                    "service_ids",
                    format!("service {} is listed more than once", service_id),
                ));
            }
        }

        let payer = self.ctx.directory.get_payer(request.payer_id).await?;
        if !payer.is_active() {
            return Err(RevenueError::business(
                ReasonCode::PartyInactive,
                format!("payer {} is {}", request.payer_id, payer.status.as_str()),
            ));
        }

        let mut services: Vec<Service> = Vec::with_capacity(request.service_ids.len());
        for service_id in &request.service_ids {
            let service = uow
                .tx()
                .load_service(*service_id)
                .await?
                .ok_or_else(|| RevenueError::not_found("Service", service_id))?;

            if let Some(first) = services.first() {
                if first.client_id != service.client_id {
                    return Err(RevenueError::business(
                        ReasonCode::ClientMismatch,
                        format!(
                            "service {} belongs to client {}, expected {}",
                            service_id, service.client_id, first.client_id
                        ),
                    ));
                }
            }
            if service.billing_status != BillingStatus::ReadyForBilling {
                return Err(RevenueError::business(
                    ReasonCode::ServiceNotReady,
                    format!(
                        "service {} is {}, not READY_FOR_BILLING",
                        service_id, service.billing_status
                    ),
                ));
            }
            let check = self.readiness.assess(uow, &service).await?;
            if !check.is_valid {
                return Err(RevenueError::business(
                    ReasonCode::ServiceNotReady,
                    format!(
                        "service {} failed billing validation: {}",
                        service_id,
                        check.errors.join("; ")
                    ),
                ));
            }
            services.push(service);
        }

        let Some(first) = services.first() else {
            return Err(ClaimError::NoServices.into());
        };
        let client_id = first.client_id;
        let total = Money::sum(first.amount.currency(), services.iter().map(|s| &s.amount))?;
        let period = DateRange::spanning(services.iter().map(|s| s.service_date))?;

        let mut claim = Claim::new_original(
            client_id,
            request.payer_id,
            total,
            period,
            request.service_ids.clone(),
        )?;
        claim.notes = request.notes;
        uow.tx().insert_claim(&claim).await?;
        uow.tx()
            .append_history(&ClaimStatusHistoryEntry::created(
                claim.id,
                actor,
                Some(format!("created from {} services", services.len())),
            ))
            .await?;

        for mut service in services {
            let from = service.billing_status;
            service.assign_to_claim(claim.id)?;
            uow.tx().update_service(&service).await?;
            uow.record(LifecycleEvent::ServiceStatusChanged {
                service_id: service.id,
                from,
                to: service.billing_status,
            });
        }

        uow.record(LifecycleEvent::ClaimCreated {
            claim_id: claim.id,
            claim_number: claim.claim_number.clone(),
        });
        info!(
            claim_id = %claim.id,
            claim_number = %claim.claim_number,
            total = %claim.total_amount,
            actor,
            "claim created"
        );
        Ok(claim)
    }

    /// Creates an ADJUSTMENT, REPLACEMENT or VOID claim against a submitted original
    #[instrument(skip(self, notes))]
    pub async fn create_related_claim(
        &self,
        original_id: ClaimId,
        claim_type: ClaimType,
        total_override: Option<Decimal>,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Claim, RevenueError> {
        let (claim, events) = self
            .ctx
            .bounded("create_related_claim", async {
                let mut uow = self.ctx.begin().await?;
                let result = self
                    .create_related_claim_in(
                        &mut uow,
                        original_id,
                        claim_type,
                        total_override,
                        notes,
                        actor,
                    )
                    .await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(claim)
    }

    pub async fn create_related_claim_in(
        &self,
        uow: &mut UnitOfWork,
        original_id: ClaimId,
        claim_type: ClaimType,
        total_override: Option<Decimal>,
        notes: Option<String>,
        actor: &str,
    ) -> Result<Claim, RevenueError> {
        let original = self.lock_claim(uow, original_id).await?;
        let total =
            total_override.map(|amount| Money::new(amount, original.total_amount.currency()));
        let claim = Claim::new_related(&original, claim_type, total, notes)?;

        uow.tx().insert_claim(&claim).await?;
        uow.tx()
            .append_history(&ClaimStatusHistoryEntry::created(
                claim.id,
                actor,
                Some(format!("{} of {}", claim_type.as_str(), original.claim_number)),
            ))
            .await?;
        uow.record(LifecycleEvent::ClaimCreated {
            claim_id: claim.id,
            claim_number: claim.claim_number.clone(),
        });
        info!(
            claim_id = %claim.id,
            original = %original.claim_number,
            claim_type = claim_type.as_str(),
            actor,
            "related claim created"
        );
        Ok(claim)
    }

    // ========================================================================
    // Status changes
    // ========================================================================

    #[instrument(skip(self, update, notes), fields(target = %update.target()))]
    pub async fn update_status(
        &self,
        claim_id: ClaimId,
        update: ClaimStatusUpdate,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Claim, RevenueError> {
        let (claim, events) = self
            .ctx
            .bounded("update_claim_status", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.update_status_in(&mut uow, claim_id, update, actor, notes).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(claim)
    }

    /// Applies a status command against the claim as committed
    pub async fn update_status_in(
        &self,
        uow: &mut UnitOfWork,
        claim_id: ClaimId,
        update: ClaimStatusUpdate,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Claim, RevenueError> {
        self.check_update(&update)?;
        let mut claim = self.lock_claim(uow, claim_id).await?;

        let from = match claim.apply_update(&update) {
            Ok(from) => from,
            Err(e) => {
                self.rejected(&claim, update.target());
                return Err(e.into());
            }
        };

        let notes = match &update {
            ClaimStatusUpdate::Void { reason } | ClaimStatusUpdate::Deny { reason, .. } => {
                Some(match notes {
                    Some(notes) => format!("{}: {}", reason, notes),
                    None => reason.clone(),
                })
            }
            _ => notes,
        };

        uow.tx().update_claim(&claim).await?;
        uow.tx()
            .append_history(&ClaimStatusHistoryEntry::transition(
                claim_id,
                from,
                claim.status,
                actor,
                notes,
            ))
            .await?;
        self.cascade(uow, &claim, from, actor).await?;

        uow.record(LifecycleEvent::ClaimStatusChanged {
            claim_id,
            from,
            to: claim.status,
        });
        info!(%claim_id, %from, to = %claim.status, actor, "claim status changed");
        Ok(claim)
    }

    /// Moves a payable claim to PAID
    pub(crate) async fn mark_paid_in(
        &self,
        uow: &mut UnitOfWork,
        claim: &mut Claim,
        actor: &str,
        notes: Option<String>,
    ) -> Result<ClaimStatus, RevenueError> {
        let from = match claim.mark_paid(self.ctx.today()) {
            Ok(from) => from,
            Err(e) => {
                self.rejected(claim, ClaimStatus::Paid);
                return Err(e.into());
            }
        };
        uow.tx().update_claim(claim).await?;
        uow.tx()
            .append_history(&ClaimStatusHistoryEntry::transition(
                claim.id,
                from,
                ClaimStatus::Paid,
                actor,
                notes,
            ))
            .await?;
        uow.record(LifecycleEvent::ClaimStatusChanged {
            claim_id: claim.id,
            from,
            to: ClaimStatus::Paid,
        });
        info!(claim_id = %claim.id, %from, actor, "claim paid");
        Ok(from)
    }

    /// Returns a PAID claim to the status it held before payment
    ///
    /// The PAID entry stays in the history; a REVERSAL entry is appended.
    pub(crate) async fn revert_paid_in(
        &self,
        uow: &mut UnitOfWork,
        claim: &mut Claim,
        actor: &str,
        notes: Option<String>,
    ) -> Result<ClaimStatus, RevenueError> {
        let history = uow.tx().load_history(claim.id).await?;
        let previous = status_before_paid(&history).ok_or_else(|| {
            RevenueError::business(
                ReasonCode::HistoryInconsistent,
                format!("claim {} has no PAID entry to reverse", claim.claim_number),
            )
        })?;
        claim.revert_payment(previous)?;
        uow.tx().update_claim(claim).await?;
        uow.tx()
            .append_history(&ClaimStatusHistoryEntry::reversal(claim.id, previous, actor, notes))
            .await?;
        uow.record(LifecycleEvent::ClaimStatusChanged {
            claim_id: claim.id,
            from: ClaimStatus::Paid,
            to: previous,
        });
        info!(claim_id = %claim.id, restored = %previous, actor, "claim payment reversed");
        Ok(previous)
    }

    // ========================================================================
    // Settlement and reads
    // ========================================================================

    /// Flips the BILLED services of a PAID claim to PAID
    #[instrument(skip(self))]
    pub async fn settle_claim_services(
        &self,
        claim_id: ClaimId,
        actor: &str,
    ) -> Result<SettlementResult, RevenueError> {
        let (settlement, events) = self
            .ctx
            .bounded("settle_claim_services", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.settle_claim_services_in(&mut uow, claim_id, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(settlement)
    }

    pub async fn settle_claim_services_in(
        &self,
        uow: &mut UnitOfWork,
        claim_id: ClaimId,
        actor: &str,
    ) -> Result<SettlementResult, RevenueError> {
        let claim = self.lock_claim(uow, claim_id).await?;
        if claim.status != ClaimStatus::Paid {
            return Err(ClaimError::NotPaid(claim.status).into());
        }

        let mut settlement = SettlementResult {
            claim_id,
            settled: Vec::new(),
            skipped: Vec::new(),
        };
        for mut service in uow.tx().services_for_claim(claim_id).await? {
            if service.billing_status != BillingStatus::Billed {
                settlement.skipped.push(service.id);
                continue;
            }
            self.move_service(uow, &mut service, BillingStatus::Paid).await?;
            settlement.settled.push(service.id);
        }
        info!(
            %claim_id,
            settled = settlement.settled.len(),
            skipped = settlement.skipped.len(),
            actor,
            "claim services settled"
        );
        Ok(settlement)
    }

    #[instrument(skip(self))]
    pub async fn get_claim(&self, claim_id: ClaimId) -> Result<Claim, RevenueError> {
        self.ctx
            .read("get_claim", move || async move {
                let mut uow = self.ctx.begin().await?;
                let found = uow.tx().load_claim(claim_id).await;
                uow.rollback().await;
                found?.ok_or_else(|| RevenueError::not_found("Claim", claim_id))
            })
            .await
    }

    /// The claim's status history in append order
    #[instrument(skip(self))]
    pub async fn claim_history(
        &self,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimStatusHistoryEntry>, RevenueError> {
        self.ctx
            .read("claim_history", move || async move {
                let mut uow = self.ctx.begin().await?;
                let result = Self::history_of(&mut uow, claim_id).await;
                uow.rollback().await;
                result
            })
            .await
    }

    async fn history_of(
        uow: &mut UnitOfWork,
        claim_id: ClaimId,
    ) -> Result<Vec<ClaimStatusHistoryEntry>, RevenueError> {
        if uow.tx().load_claim(claim_id).await?.is_none() {
            return Err(RevenueError::not_found("Claim", claim_id));
        }
        Ok(uow.tx().load_history(claim_id).await?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_update(&self, update: &ClaimStatusUpdate) -> Result<(), RevenueError> {
        match update {
            ClaimStatusUpdate::Submit { date, .. } if *date > self.ctx.today() => {
                Err(RevenueError::validation(
                    "date",
                    format!("submission date {} is in the future", date),
                ))
            }
            ClaimStatusUpdate::Deny { reason, .. } | ClaimStatusUpdate::Void { reason }
                if reason.trim().is_empty() =>
            {
                Err(RevenueError::validation("reason", "a reason is required"))
            }
            _ => Ok(()),
        }
    }

    async fn cascade(
        &self,
        uow: &mut UnitOfWork,
        claim: &Claim,
        from: ClaimStatus,
        actor: &str,
    ) -> Result<(), RevenueError> {
        let (source, target) = match claim.status {
            ClaimStatus::Submitted => (BillingStatus::InClaim, BillingStatus::Billed),
            ClaimStatus::Denied => (BillingStatus::Billed, BillingStatus::Denied),
            ClaimStatus::Void if !from.is_submitted() => {
                (BillingStatus::InClaim, BillingStatus::ReadyForBilling)
            }
            ClaimStatus::Void => {
                for mut service in uow.tx().services_for_claim(claim.id).await? {
                    if !service.billing_status.is_terminal() {
                        self.intake.void_in(uow, &mut service, actor).await?;
                    }
                }
                return Ok(());
            }
            _ => return Ok(()),
        };

        for mut service in uow.tx().services_for_claim(claim.id).await? {
            if service.billing_status == source {
                self.move_service(uow, &mut service, target).await?;
            }
        }
        Ok(())
    }

    async fn move_service(
        &self,
        uow: &mut UnitOfWork,
        service: &mut Service,
        target: BillingStatus,
    ) -> Result<(), RevenueError> {
        let from = service.transition_to(target)?;
        uow.tx().update_service(service).await?;
        uow.record(LifecycleEvent::ServiceStatusChanged {
            service_id: service.id,
            from,
            to: target,
        });
        Ok(())
    }

    fn rejected(&self, claim: &Claim, target: ClaimStatus) {
        warn!(
            claim_id = %claim.id,
            from = %claim.status,
            to = %target,
            "claim status transition rejected"
        );
        self.ctx.emit(Signal::TransitionRejected {
            entity: "claim".to_string(),
            id: claim.id.to_string(),
            from: claim.status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
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
