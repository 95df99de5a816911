//! Authorization ledger
//!
//! The only writer of an authorization's used units. Reservations and
//! releases read the authorization under lock inside the caller's unit of
//! work, so two concurrent reservations can never both see the same
//! remaining balance.

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use core_kernel::AuthorizationId;
use domain_billing::{Authorization, UnitBalance};

use crate::context::{EngineContext, UnitOfWork};
use crate::error::RevenueError;
use crate::events::Signal;

#[derive(Clone)]
pub struct AuthorizationLedger {
    ctx: EngineContext,
}

impl AuthorizationLedger {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Stores a new authorization grant
    #[instrument(skip(self, authorization), fields(authorization_id = %authorization.id))]
    pub async fn register(
        &self,
        authorization: Authorization,
    ) -> Result<Authorization, RevenueError> {
        authorization.check_bounds()?;
        let (authorization, events) = self
            .ctx
            .bounded("register_authorization", async {
                let mut uow = self.ctx.begin().await?;
                let inserted = uow.tx().insert_authorization(&authorization).await;
                let result = inserted.map(|_| authorization).map_err(RevenueError::from);
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        info!(authorized_units = %authorization.authorized_units, "authorization registered");
        Ok(authorization)
    }

    /// Reserves units in a transaction of its own
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        authorization_id: AuthorizationId,
        units: Decimal,
    ) -> Result<UnitBalance, RevenueError> {
        let (balance, events) = self
            .ctx
            .bounded("reserve_units", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.reserve_in(&mut uow, authorization_id, units).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(balance)
    }

    /// Releases units in a transaction of its own
    #[instrument(skip(self))]
    pub async fn release(
        &self,
        authorization_id: AuthorizationId,
        units: Decimal,
    ) -> Result<UnitBalance, RevenueError> {
        let (balance, events) = self
            .ctx
            .bounded("release_units", async {
                let mut uow = self.ctx.begin().await?;
                let result = self.release_in(&mut uow, authorization_id, units).await;
                uow.finish(result).await
            })
            .await?;
        self.ctx.dispatch(events).await;
        Ok(balance)
    }

    /// Deducts `units` from the authorization
    ///
    /// Fails without any change if the authorization is inactive or the
    /// grant would be exceeded. Emits a utilization signal when the
    /// reservation moves the authorization into a higher band.
    pub async fn reserve_in(
        &self,
        uow: &mut UnitOfWork,
        authorization_id: AuthorizationId,
        units: Decimal,
    ) -> Result<UnitBalance, RevenueError> {
        if units <= Decimal::ZERO {
            return Err(RevenueError::validation(
                "units",
                format!("units must be positive, got {}", units),
            ));
        }
        let mut authorization = self.lock(uow, authorization_id).await?;
        let thresholds = self.ctx.config.rules.utilization;
        let before = authorization.utilization_level(&thresholds);

        let balance = match authorization.reserve(units) {
            Ok(balance) => balance,
            Err(e) => {
                warn!(%authorization_id, %units, error = %e, "reservation refused");
                return Err(e.into());
            }
        };
        authorization.check_bounds()?;
        uow.tx().update_authorization(&authorization).await?;

        let after = authorization.utilization_level(&thresholds);
        if after > before {
            self.ctx.emit(Signal::AuthorizationUtilization {
                authorization_id,
                level: after,
                utilization_percent: authorization.utilization_percent(),
                remaining_units: balance.remaining_units,
            });
        }
        debug!(%authorization_id, %units, remaining = %balance.remaining_units, "units reserved");
        Ok(balance)
    }

    /// Returns `units` to the authorization, never dropping below zero used
    pub async fn release_in(
        &self,
        uow: &mut UnitOfWork,
        authorization_id: AuthorizationId,
        units: Decimal,
    ) -> Result<UnitBalance, RevenueError> {
        if units <= Decimal::ZERO {
            return Err(RevenueError::validation(
                "units",
                format!("units must be positive, got {}", units),
            ));
        }
        let mut authorization = self.lock(uow, authorization_id).await?;
        let balance = authorization.release(units)?;
        uow.tx().update_authorization(&authorization).await?;
        debug!(%authorization_id, %units, remaining = %balance.remaining_units, "units released");
        Ok(balance)
    }

    /// Current balance; read-only
    #[instrument(skip(self))]
    pub async fn balance(
        &self,
        authorization_id: AuthorizationId,
    ) -> Result<UnitBalance, RevenueError> {
        self.ctx
            .read("authorization_balance", move || async move {
                let mut uow = self.ctx.begin().await?;
                let found = uow.tx().load_authorization(authorization_id).await;
                uow.rollback().await;
                found?
                    .map(|a| a.balance())
                    .ok_or_else(|| RevenueError::not_found("Authorization", authorization_id))
            })
            .await
    }

    async fn lock(
        &self,
        uow: &mut UnitOfWork,
        authorization_id: AuthorizationId,
    ) -> Result<Authorization, RevenueError> {
        uow.tx()
            .load_authorization(authorization_id)
            .await?
            .ok_or_else(|| RevenueError::not_found("Authorization", authorization_id))
    }
}
