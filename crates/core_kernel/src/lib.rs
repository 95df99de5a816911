//! Core Kernel - Foundational types shared by every revenue cycle crate
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic
//! - Inclusive date ranges and the billing timezone
//! - Strongly-typed identifiers
//! - The port error taxonomy used by every adapter

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError};
pub use temporal::{DateRange, Timezone, TemporalError};
pub use identifiers::{
    ClientId, PayerId, ProgramId, ServiceTypeId, ServiceId, DocumentId,
    AuthorizationId, ClaimId, StatusHistoryId, PaymentId, ClaimPaymentId,
};
pub use ports::{
    PortError, DomainPort, AdapterHealth, HealthCheckResult, HealthCheckable,
};
pub use error::CoreError;
