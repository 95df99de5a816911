//! Sinks that forward signals and events to `tracing`

use async_trait::async_trait;
use tracing::{error, info, warn};

use core_kernel::{DomainPort, PortError};

use crate::events::{LifecycleEvent, Signal, SignalSeverity};
use crate::ports::{NotificationPort, ObservabilityPort};

/// Logs each signal at a level matching its severity
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservability;

impl DomainPort for TracingObservability {}

impl ObservabilityPort for TracingObservability {
    fn emit(&self, signal: Signal) {
        let payload = serde_json::to_string(&signal).unwrap_or_else(|_| format!("{:?}", signal));
        match signal.severity() {
            SignalSeverity::Warning => {
                warn!(target: "revenue::signal", signal = %payload, "engine signal")
            }
            SignalSeverity::Critical => {
                error!(target: "revenue::signal", signal = %payload, "engine signal")
            }
        }
    }
}

/// Logs committed lifecycle events as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl DomainPort for TracingNotifier {}

#[async_trait]
impl NotificationPort for TracingNotifier {
    async fn notify(&self, event: &LifecycleEvent) -> Result<(), PortError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| PortError::internal(format!("cannot serialize {}: {}", event.name(), e)))?;
        info!(
            target: "revenue::event",
            event = event.name(),
            payload = %payload,
            "lifecycle event"
        );
        Ok(())
    }
}
