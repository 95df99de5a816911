//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the revenue engine using SQLx.
//!
//! # Architecture
//!
//! The engine talks to storage only through the `BillingStore` and
//! `DirectoryPort` traits. This crate provides their PostgreSQL adapters,
//! the row types they decode into, and the embedded schema migrations.
//!
//! Every engine unit of work is one database transaction. Loads inside a
//! transaction take row locks, so two reconciliations of the same claim or
//! two reservations against the same authorization serialize instead of
//! racing.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/revenue")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresBillingStore, PostgresDirectory};
