//! Shared engine context and the unit of work

use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use core_kernel::PortError;

use crate::config::EngineConfig;
use crate::error::RevenueError;
use crate::events::{LifecycleEvent, Signal};
use crate::ports::{
    BillingStore, DirectoryPort, NotificationPort, ObservabilityPort, StoreTransaction,
};

/// One store transaction plus the events it will publish on commit
///
/// Every mutating component method takes `&mut UnitOfWork`, so several
/// component calls can share one transaction.
pub struct UnitOfWork {
    tx: Box<dyn StoreTransaction>,
    events: Vec<LifecycleEvent>,
}

impl UnitOfWork {
    pub async fn begin(store: &dyn BillingStore) -> Result<Self, RevenueError> {
        Ok(Self {
            tx: store.begin().await?,
            events: Vec::new(),
        })
    }

    pub fn tx(&mut self) -> &mut dyn StoreTransaction {
        self.tx.as_mut()
    }

    /// Queues an event for dispatch after commit
    pub fn record(&mut self, event: LifecycleEvent) {
        self.events.push(event);
    }

    pub fn pending_events(&self) -> &[LifecycleEvent] {
        &self.events
    }

    /// Commits and hands back the queued events
    pub async fn commit(self) -> Result<Vec<LifecycleEvent>, RevenueError> {
        self.tx.commit().await?;
        Ok(self.events)
    }

    pub async fn rollback(self) {
        if let Err(e) = self.tx.rollback().await {
            warn!(error = %e, "rollback failed");
        }
    }

    /// Commits on `Ok`, rolls back on `Err`
    pub async fn finish<T>(
        self,
        result: Result<T, RevenueError>,
    ) -> Result<(T, Vec<LifecycleEvent>), RevenueError> {
        match result {
            Ok(value) => {
                let events = self.commit().await?;
                Ok((value, events))
            }
            Err(err) => {
                self.rollback().await;
                Err(err)
            }
        }
    }
}

/// Ports and configuration shared by every component
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn BillingStore>,
    pub directory: Arc<dyn DirectoryPort>,
    pub observability: Arc<dyn ObservabilityPort>,
    pub notifier: Arc<dyn NotificationPort>,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn BillingStore>,
        directory: Arc<dyn DirectoryPort>,
        observability: Arc<dyn ObservabilityPort>,
        notifier: Arc<dyn NotificationPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            observability,
            notifier,
            config: Arc::new(config),
        }
    }

    pub async fn begin(&self) -> Result<UnitOfWork, RevenueError> {
        UnitOfWork::begin(self.store.as_ref()).await
    }

    /// Runs `operation` under the configured timeout
    ///
    /// On timeout the future is dropped, and with it any open transaction.
    pub async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, RevenueError>
    where
        F: Future<Output = Result<T, RevenueError>>,
    {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
                Err(RevenueError::Infra(PortError::Timeout {
                    operation: operation.to_string(),
                    duration_ms: limit.as_millis() as u64,
                }))
            }
        }
    }

    /// Runs an idempotent read, retrying once on a transient failure
    pub async fn read<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, RevenueError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RevenueError>>,
    {
        match self.bounded(operation, f()).await {
            Err(err) if err.is_transient() => {
                warn!(operation, error = %err, "transient read failure, retrying once");
                self.bounded(operation, f()).await
            }
            other => other,
        }
    }

    /// Delivers committed events; failures are logged and dropped
    pub async fn dispatch(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            match self.notifier.notify(&event).await {
                Ok(()) => debug!(event = event.name(), "notification delivered"),
                Err(e) => warn!(event = event.name(), error = %e, "notification failed"),
            }
        }
    }

    pub fn emit(&self, signal: Signal) {
        self.observability.emit(signal);
    }

    /// Today's date in the billing timezone
    pub fn today(&self) -> NaiveDate {
        self.config.rules.timezone.date_of(Utc::now())
    }
}
