//! Service intake
//!
//! Records services, edits them while they are still editable, attaches
//! documentation and voids them. Units are reserved against the service's
//! authorization at recording time and kept in step with every edit, so an
//! authorization is never overcommitted by services that are not billed yet.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use core_kernel::{AuthorizationId, ClientId, Money, PayerId, ServiceId, ServiceTypeId};
use domain_billing::{BillingStatus, DocumentType, Service, ServiceDocument, ServiceType};

use crate::batch::BatchOutcome;
use crate::context::{EngineContext, UnitOfWork};
use crate::error::{ReasonCode, RevenueError};
use crate::events::{LifecycleEvent, Signal};
use crate::ledger::AuthorizationLedger;

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut error = ValidationError::new("positive");
        error.message = Some("must be greater than zero".into());
        return Err(error);
    }
    Ok(())
}

/// A document supplied with a service
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewDocument {
    pub document_type: DocumentType,
    #[validate(length(max = 100_000))]
    pub content: String,
    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl From<NewDocument> for ServiceDocument {
    fn from(doc: NewDocument) -> Self {
        ServiceDocument {
            id: core_kernel::DocumentId::new_v7(),
            document_type: doc.document_type,
            content: doc.content,
            signed_by: doc.signed_by,
            signed_at: doc.signed_at,
        }
    }
}

/// A service as submitted for recording
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewService {
    pub client_id: ClientId,
    pub service_type_id: ServiceTypeId,
    pub payer_id: Option<PayerId>,
    pub service_date: NaiveDate,
    #[validate(custom(function = "positive"))]
    pub units: Decimal,
    /// Rate per unit in USD
    #[validate(custom(function = "positive"))]
    pub rate: Decimal,
    pub authorization_id: Option<AuthorizationId>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[serde(default)]
    pub documents: Vec<NewDocument>,
}

#[derive(Clone)]
pub struct ServiceIntake {
    ctx: EngineContext,
    ledger: AuthorizationLedger,
}

impl ServiceIntake {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ledger: AuthorizationLedger::new(ctx.clone()),
            ctx,
        }
    }

    /// Stores a service type
    #[instrument(skip(self, service_type), fields(code = %service_type.code))]
    pub async fn register_service_type(
        &self,
        service_type: ServiceType,
    ) -> Result<ServiceType, RevenueError> {
        let (service_type, _) = self
            .ctx
            .bounded("register_service_type", async {
                let mut uow = self.ctx.begin().await?;
                let inserted = uow.tx().insert_service_type(&service_type).await;
                let result = inserted.map(|_| service_type).map_err(RevenueError::from);
                uow.finish(result).await
            })
            .await?;
        Ok(service_type)
    }

    /// Records one service, reserving its units in the same transaction
    #[instrument(skip(self, new), fields(client_id = %new.client_id))]
    pub async fn record_service(
        &self,
        new: NewService,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let (service, events) = self
            .ctx
            .bounded("record_service", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.record_service_in(&mut uow, new, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(service)
    }

    /// Records each service in its own transaction
    #[instrument(skip(self, services), fields(count = services.len()))]
    pub async fn import_services(
        &self,
        services: Vec<NewService>,
        actor: &str,
    ) -> BatchOutcome<Service> {
        let mut outcome = BatchOutcome::default();
        for (index, new) in services.into_iter().enumerate() {
            let reference = format!("{}@{}", new.client_id, new.service_date);
            let result = self.record_service(new, actor).await;
            outcome.push(index, reference, result);
        }
        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "service import finished"
        );
        self.ctx
            .dispatch(vec![LifecycleEvent::ServicesImported {
                succeeded: outcome.succeeded.len(),
                failed: outcome.failed.len(),
            }])
            .await;
        outcome
    }

    pub async fn record_service_in(
        &self,
        uow: &mut UnitOfWork,
        new: NewService,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        new.validate()?;
        for document in &new.documents {
            document.validate()?;
        }

        let service_type = uow
            .tx()
            .load_service_type(new.service_type_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("ServiceType", new.service_type_id))?;

        let client = self.ctx.directory.get_client(new.client_id).await?;
        if !client.is_active() {
            return Err(RevenueError::business(
                ReasonCode::PartyInactive,
                format!("client {} is {}", new.client_id, client.status.as_str()),
            ));
        }

        let now = Utc::now();
        let mut service = Service::new(
            new.client_id,
            &service_type,
            new.service_date,
            new.units,
            Money::usd(new.rate),
        )?;
        service.payer_id = new.payer_id;
        service.authorization_id = new.authorization_id;
        service.notes = new.notes;
        service.documents = new.documents.into_iter().map(ServiceDocument::from).collect();
        service.refresh_documentation(service_type.category, now);

        if let Some(authorization_id) = service.authorization_id {
            self.ledger.reserve_in(uow, authorization_id, service.units).await?;
            service.reserved_units = service.units;
        }

        uow.tx().insert_service(&service).await?;
        uow.record(LifecycleEvent::ServiceRecorded { service_id: service.id });
        info!(service_id = %service.id, actor, units = %service.units, "service recorded");
        Ok(service)
    }

    /// Attaches a document and re-derives documentation status
    #[instrument(skip(self, document))]
    pub async fn attach_document(
        &self,
        service_id: ServiceId,
        document: NewDocument,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let (service, events) = self
            .ctx
            .bounded("attach_document", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.attach_document_in(&mut uow, service_id, document, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(service)
    }

    pub async fn attach_document_in(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
        document: NewDocument,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        document.validate()?;
        let mut service = self.lock(uow, service_id).await?;
        let service_type = uow
            .tx()
            .load_service_type(service.service_type_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("ServiceType", service.service_type_id))?;

        let status = service.attach_document(document.into(), service_type.category, Utc::now())?;
        uow.tx().update_service(&service).await?;
        uow.record(LifecycleEvent::ServiceUpdated { service_id });
        info!(%service_id, actor, documentation = status.as_str(), "document attached");
        Ok(service)
    }

    /// Changes units and rate, moving the reservation by the unit delta
    #[instrument(skip(self))]
    pub async fn update_units_and_rate(
        &self,
        service_id: ServiceId,
        units: Decimal,
        rate: Decimal,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let (service, events) = self
            .ctx
            .bounded("update_units_and_rate", async {
                let mut uow = self.ctx.begin().await?;
                let result = self
                    .update_units_and_rate_in(&mut uow, service_id, units, rate, actor)
                    .await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(service)
    }

    pub async fn update_units_and_rate_in(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
        units: Decimal,
        rate: Decimal,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let mut service = self.lock(uow, service_id).await?;
        service.set_units_and_rate(units, Money::usd(rate))?;

        if let Some(authorization_id) = service.authorization_id {
            let delta = service.units - service.reserved_units;
            if delta > Decimal::ZERO {
                self.ledger.reserve_in(uow, authorization_id, delta).await?;
            } else if delta < Decimal::ZERO {
                self.ledger.release_in(uow, authorization_id, -delta).await?;
            }
            service.reserved_units = service.units;
        }

        uow.tx().update_service(&service).await?;
        uow.record(LifecycleEvent::ServiceUpdated { service_id });
        info!(%service_id, actor, %units, %rate, "service units and rate updated");
        Ok(service)
    }

    /// Moves a service along the billing-status graph
    ///
    /// Only edges that are not owned by another workflow are accepted here:
    /// READY_FOR_BILLING → UNBILLED and voiding. READY_FOR_BILLING is
    /// entered through the readiness validator, claim statuses through the
    /// claim lifecycle.
    #[instrument(skip(self))]
    pub async fn transition_billing_status(
        &self,
        service_id: ServiceId,
        target: BillingStatus,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let (service, events) = self
            .ctx
            .bounded("transition_billing_status", async {
                let mut uow = self.ctx.begin().await?;
                let result =
                    self.transition_billing_status_in(&mut uow, service_id, target, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(service)
    }

    pub async fn transition_billing_status_in(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
        target: BillingStatus,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let service = self.lock(uow, service_id).await?;
        self.transition_billing_status_with(uow, service, target, actor).await
    }

    async fn transition_billing_status_with(
        &self,
        uow: &mut UnitOfWork,
        mut service: Service,
        target: BillingStatus,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let service_id = service.id;
        let from = service.billing_status;
        if !from.can_transition_to(target) {
            self.ctx.emit(Signal::TransitionRejected {
                entity: "service".to_string(),
                id: service_id.to_string(),
                from: from.as_str().to_string(),
                to: target.as_str().to_string(),
            });
            warn!(%service_id, %from, to = %target, "billing status transition rejected");
            return Err(RevenueError::business(
                ReasonCode::InvalidBillingStatusTransition,
                format!("service {} cannot move from {} to {}", service_id, from, target),
            ));
        }

        match target {
            BillingStatus::Void => {
                if matches!(from, BillingStatus::InClaim | BillingStatus::Billed) {
                    return Err(RevenueError::business(
                        ReasonCode::ClaimDrivenTransition,
                        format!("service {} is on a claim; void the claim instead", service_id),
                    ));
                }
                self.void_in(uow, &mut service, actor).await?;
            }
            BillingStatus::Unbilled => {
                service.transition_to(BillingStatus::Unbilled)?;
                uow.tx().update_service(&service).await?;
                uow.record(LifecycleEvent::ServiceStatusChanged { service_id, from, to: target });
            }
            BillingStatus::ReadyForBilling => {
                return Err(RevenueError::business(
                    ReasonCode::ValidationRequired,
                    format!(
                        "service {} must pass billing validation to become READY_FOR_BILLING",
                        service_id
                    ),
                ));
            }
            BillingStatus::InClaim
            | BillingStatus::Billed
            | BillingStatus::Paid
            | BillingStatus::Denied => {
                return Err(RevenueError::business(
                    ReasonCode::ClaimDrivenTransition,
                    format!("{} is set by the claim lifecycle", target),
                ));
            }
        }
        info!(%service_id, actor, %from, to = %target, "service status changed");
        Ok(service)
    }

    /// Voids a service that is not on a live claim
    #[instrument(skip(self))]
    pub async fn void_service(
        &self,
        service_id: ServiceId,
        reason: &str,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        let (service, events) = self
            .ctx
            .bounded("void_service", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.void_service_in(&mut uow, service_id, reason, actor).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(service)
    }

    pub async fn void_service_in(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
        reason: &str,
        actor: &str,
    ) -> Result<Service, RevenueError> {
        if reason.trim().is_empty() {
            return Err(RevenueError::validation("reason", "a void reason is required"));
        }
        let mut service = self.lock(uow, service_id).await?;
        service.notes = Some(match service.notes.take() {
            Some(notes) => format!("{}\nVoided: {}", notes, reason),
            None => format!("Voided: {}", reason),
        });
        let voided = self
            .transition_billing_status_with(uow, service, BillingStatus::Void, actor)
            .await?;
        Ok(voided)
    }

    /// Voids a service and returns its reserved units
    pub(crate) async fn void_in(
        &self,
        uow: &mut UnitOfWork,
        service: &mut Service,
        actor: &str,
    ) -> Result<(), RevenueError> {
        let from = service.transition_to(BillingStatus::Void)?;
        if let Some(authorization_id) = service.authorization_id {
            if service.reserved_units > Decimal::ZERO {
                self.ledger.release_in(uow, authorization_id, service.reserved_units).await?;
                service.reserved_units = Decimal::ZERO;
            }
        }
        uow.tx().update_service(service).await?;
        uow.record(LifecycleEvent::ServiceStatusChanged {
            service_id: service.id,
            from,
            to: BillingStatus::Void,
        });
        info!(service_id = %service.id, actor, %from, "service voided");
        Ok(())
    }

    async fn lock(
        &self,
        uow: &mut UnitOfWork,
        service_id: ServiceId,
    ) -> Result<Service, RevenueError> {
        uow.tx()
            .load_service(service_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Service", service_id))
    }
}
