//! Claims Domain
//!
//! The claim aggregate, its lifecycle graph and its append-only status
//! history.
//!
//! # Claim Lifecycle
//!
//! ```text
//! DRAFT -> VALIDATED -> SUBMITTED -> ACKNOWLEDGED -> PENDING -> DENIED -> APPEALED
//!   \__________________/    |             |            |   ^                 |
//!                           +-------------+------------+---|---> PAID <------+
//!                                                          +-----------------+
//! any non-terminal -> VOID
//! ```
//!
//! PAID is only entered by payment reconciliation; `ClaimStatusUpdate` has
//! no variant for it.

pub mod claim;
pub mod history;
pub mod error;

pub use claim::{Claim, ClaimStatus, ClaimStatusUpdate, ClaimType, SubmissionMethod};
pub use history::{
    check_history, status_before_paid, ClaimStatusHistoryEntry, HistoryEntryKind, HistoryViolation,
};
pub use error::ClaimError;
