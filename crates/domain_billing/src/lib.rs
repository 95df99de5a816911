//! Billing Domain - Services, Authorizations and Billing Readiness
//!
//! This crate holds the entities that sit upstream of a claim:
//!
//! - **Services**: billable units of care, their billing-status graph and the
//!   documentation-status derivation
//! - **Authorizations**: payer-granted unit allowances and their unit arithmetic
//! - **Readiness**: the ordered rule set deciding whether a service may be billed
//!
//! Everything here is pure. Transactions, locking and signalling are the
//! revenue engine's concern.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{Service, BillingStatus};
//!
//! let mut service = Service::new(client_id, &service_type, date, units, rate)?;
//! service.transition_to(BillingStatus::ReadyForBilling)?;
//! ```

pub mod service;
pub mod authorization;
pub mod readiness;
pub mod validation;
pub mod error;

pub use service::{
    BillingStatus, DocumentationStatus, DocumentType, DocumentGap, Service, ServiceCategory,
    ServiceDocument, ServiceType, derive_documentation_status, documentation_gaps,
};
pub use authorization::{
    Authorization, AuthorizationStatus, UnitBalance, UtilizationLevel, UtilizationThresholds,
};
pub use readiness::{BillingRules, ReadinessInput, check_readiness};
pub use validation::ValidationResult;
pub use error::BillingError;
