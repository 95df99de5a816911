//! Billing readiness validator
//!
//! Loads everything the readiness rules need under lock, runs them, and
//! advances a passing UNBILLED or DENIED service to READY_FOR_BILLING in the
//! same transaction. A failing service is left untouched.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use core_kernel::ServiceId;
use domain_billing::{check_readiness, BillingStatus, ReadinessInput, Service, ValidationResult};

use crate::batch::BatchItemError;
use crate::context::{EngineContext, UnitOfWork};
use crate::error::RevenueError;
use crate::events::LifecycleEvent;

/// Result of validating one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub service_id: ServiceId,
    pub result: ValidationResult,
    /// Billing status after validation
    pub billing_status: BillingStatus,
    /// The service moved to READY_FOR_BILLING
    pub advanced: bool,
}

/// Result of validating many services, each in its own transaction
#[derive(Debug, Default)]
pub struct BatchValidation {
    pub reports: Vec<ReadinessReport>,
    /// Services that could not be validated at all (missing, infrastructure)
    pub failed: Vec<BatchItemError>,
}

impl BatchValidation {
    pub fn total(&self) -> usize {
        self.reports.len() + self.failed.len()
    }

    pub fn valid_count(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_valid).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.reports.len() - self.valid_count()
    }

    pub fn advanced_count(&self) -> usize {
        self.reports.iter().filter(|r| r.advanced).count()
    }
}

#[derive(Clone)]
pub struct BillingReadinessValidator {
    ctx: EngineContext,
}

impl BillingReadinessValidator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        service_id: ServiceId,
        actor: &str,
    ) -> Result<ReadinessReport, RevenueError> {
        let (report, events) = self
            .ctx
            .bounded("validate_service", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.validate_in(&mut uow, service_id, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(report)
    }

    /// Validates each service independently; one failure never stops the rest
    #[instrument(skip(self, service_ids), fields(count = service_ids.len()))]
    pub async fn validate_many(&self, service_ids: &[ServiceId], actor: &str) -> BatchValidation {
        let mut batch = BatchValidation::default();
        for (index, service_id) in service_ids.iter().enumerate() {
            match self.validate(*service_id, actor).await {
                Ok(report) => batch.reports.push(report),
                Err(error) => batch.failed.push(BatchItemError {
                    index,
                    reference: service_id.to_string(),
                    error,
                }),
            }
        }
        info!(
            valid = batch.valid_count(),
            invalid = batch.invalid_count(),
            failed = batch.failed.len(),
            "batch validation finished"
        );
        batch
    }

    pub async fn validate_in(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
        actor: &str,
    ) -> Result<ReadinessReport, RevenueError> {
        let mut service = uow
            .tx()
            .load_service(service_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Service", service_id))?;

        let result = self.assess(uow, &service).await?;
        let mut advanced = false;
        let advances =
            matches!(service.billing_status, BillingStatus::Unbilled | BillingStatus::Denied);
        if result.is_valid && advances {
            let from = service.transition_to(BillingStatus::ReadyForBilling)?;
            uow.tx().update_service(&service).await?;
            uow.record(LifecycleEvent::ServiceStatusChanged {
                service_id,
                from,
                to: service.billing_status,
            });
            advanced = true;
            info!(%service_id, actor, "service ready for billing");
        }

        Ok(ReadinessReport {
            service_id,
            result,
            billing_status: service.billing_status,
            advanced,
        })
    }

    /// Runs the readiness rules without changing anything
    pub(crate) async fn assess(
        &self,
        uow: &mut UnitOfWork,
        service: &Service,
    ) -> Result<ValidationResult, RevenueError> {
        let service_type = uow
            .tx()
            .load_service_type(service.service_type_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("ServiceType", service.service_type_id))?;
        let authorization = match service.authorization_id {
            Some(id) => uow.tx().load_authorization(id).await?,
            None => None,
        };
        let duplicate_count = uow.tx().count_duplicate_services(service).await?;

        let rules = &self.ctx.config.rules;
        let now = Utc::now();
        Ok(check_readiness(
            rules,
            ReadinessInput {
                service,
                service_type: &service_type,
                authorization: authorization.as_ref(),
                duplicate_count,
                today: rules.timezone.date_of(now),
                now,
            },
        ))
    }
}
