//! Revenue Engine
//!
//! The claim lifecycle and revenue reconciliation engine. Four components
//! carry the invariants of the billing back office:
//!
//! - **AuthorizationLedger**: reserves and releases authorized units
//! - **BillingReadinessValidator**: decides whether a service may be billed
//! - **ClaimLifecycle**: owns claim status, history and claim creation
//! - **ReconciliationEngine**: applies payments to claims, with undo, batch
//!   and automatic modes
//!
//! `ServiceIntake` records and edits services on top of the ledger.
//!
//! # Transactions
//!
//! Every mutating component method takes a `UnitOfWork`, which wraps one
//! store transaction. Public entry points open the unit, run under the
//! configured operation timeout, commit, and only then dispatch lifecycle
//! notifications. Dropping a unit without committing rolls it back.
//!
//! # Usage
//!
//! ```rust,ignore
//! let ctx =
//!     EngineContext::new(store, directory, observability, notifier, EngineConfig::default());
//! let engine = RevenueEngine::new(ctx);
//!
//! let claim = engine.lifecycle.convert_services_to_claim(request, "biller@clinic").await?;
//! ```

pub mod error;
pub mod config;
pub mod events;
pub mod ports;
pub mod context;
pub mod batch;
pub mod ledger;
pub mod intake;
pub mod readiness;
pub mod lifecycle;
pub mod reconciliation;
pub mod adapters;

pub use error::{FieldError, ReasonCode, RevenueError};
pub use config::{EngineConfig, ReconciliationConfig};
pub use events::{LifecycleEvent, Signal, SignalSeverity};
pub use ports::{
    BillingStore, DirectoryEntry, DirectoryPort, NotificationPort, ObservabilityPort, PartyStatus,
    StoreTransaction,
};
pub use context::{EngineContext, UnitOfWork};
pub use batch::{BatchItemError, BatchOutcome};
pub use ledger::AuthorizationLedger;
pub use intake::{NewDocument, NewService, ServiceIntake};
pub use readiness::{BatchValidation, BillingReadinessValidator, ReadinessReport};
pub use lifecycle::{ClaimLifecycle, ConvertRequest, SettlementResult};
pub use reconciliation::{
    AppliedMatch, ClaimMatch, ClaimReversal, NewPayment, ReconcileRequest, ReconciliationEngine,
    ReconciliationResult, RejectedMatch, RemittanceResult, UndoResult,
};

/// All engine components wired to one context
#[derive(Clone)]
pub struct RevenueEngine {
    pub ledger: AuthorizationLedger,
    pub intake: ServiceIntake,
    pub readiness: BillingReadinessValidator,
    pub lifecycle: ClaimLifecycle,
    pub reconciliation: ReconciliationEngine,
}

impl RevenueEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ledger: AuthorizationLedger::new(ctx.clone()),
            intake: ServiceIntake::new(ctx.clone()),
            readiness: BillingReadinessValidator::new(ctx.clone()),
            lifecycle: ClaimLifecycle::new(ctx.clone()),
            reconciliation: ReconciliationEngine::new(ctx),
        }
    }
}
