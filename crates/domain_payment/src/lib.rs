//! Payment Domain
//!
//! Money received from payers and how it is apportioned across claims.
//!
//! - **Payment**: a payer remittance and its derived reconciliation status
//! - **ClaimPayment**: the part of a payment applied to one claim, with its
//!   adjustment lines
//! - **Matching**: ranking candidate claims and planning greedy allocations
//! - **Remittance**: the parsed remittance advice the import pipeline feeds in

pub mod payment;
pub mod allocation;
pub mod matching;
pub mod remittance;
pub mod error;

pub use payment::{Payment, PaymentMethod, ReconciliationStatus};
pub use allocation::{
    derive_adjustment_codes, total_paid, AdjustmentGroup, ClaimPayment, PaymentAdjustment,
};
pub use matching::{
    plan_auto_allocation, rank_candidates, Allocation, MatchCandidate, MatchSuggestion,
};
pub use remittance::{RemittanceAdvice, RemittanceLine};
pub use error::PaymentError;
