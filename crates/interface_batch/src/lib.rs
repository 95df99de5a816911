//! Batch Interface
//!
//! Offline entry points into the revenue engine. The `remittance-import`
//! binary records a payment per remittance file and applies its advice in
//! the same transaction, or runs a bulk reconciliation from a request file.
//!
//! File handling and reporting live here so they can be exercised against
//! the in-memory adapters; the binary only wires configuration, logging and
//! the PostgreSQL adapters around them.

pub mod config;
pub mod import;

pub use config::{BatchConfig, LogFormat};
pub use import::{
    read_json, BatchImporter, FileReport, ImportError, ReconcileFile, ReconcileReport,
    RemittanceFile,
};
