//! Domain Adapters
//!
//! PostgreSQL implementations of the revenue engine's ports.
//!
//! - `PostgresBillingStore` implements `BillingStore`, one database
//!   transaction per unit of work
//! - `PostgresDirectory` implements `DirectoryPort` over the client and
//!   payer tables
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresBillingStore, PostgresDirectory};
//!
//! let store = Arc::new(PostgresBillingStore::new(pool.clone()));
//! let directory = Arc::new(PostgresDirectory::new(pool));
//! ```

pub mod rows;
pub mod store;
pub mod directory;

pub use store::{PgStoreTransaction, PostgresBillingStore};
pub use directory::PostgresDirectory;
