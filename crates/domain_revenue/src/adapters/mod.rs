//! Adapters bundled with the engine
//!
//! - **memory**: in-memory store, directory and recording sinks for tests
//!   and dry runs
//! - **logging**: observability and notification sinks that write to
//!   `tracing`
//!
//! The PostgreSQL store and directory live in `infra_db`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_revenue::adapters::{
//!     InMemoryDirectory, InMemoryStore, TracingNotifier, TracingObservability,
//! };
//!
//! let ctx = EngineContext::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(InMemoryDirectory::new()),
//!     Arc::new(TracingObservability),
//!     Arc::new(TracingNotifier),
//!     EngineConfig::default(),
//! );
//! ```

pub mod memory;
pub mod logging;

pub use memory::{
    InMemoryDirectory, InMemoryStore, MemoryState, RecordingNotifier, RecordingObservability,
};
pub use logging::{TracingNotifier, TracingObservability};
