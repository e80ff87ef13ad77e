//! Resilient batch loading for empload.
//!
//! The [`Orchestrator`] drives generation and loading batch by batch. Store
//! access goes through the [`Connector`]/[`Session`] seam, implemented for
//! PostgreSQL and MySQL on top of `sqlx` and by an in-memory store used in
//! tests.

pub mod connection;
pub mod error;
pub mod loader;
pub mod memory;
pub mod mysql;
pub mod orchestrator;
pub mod postgres;
pub mod retry;
pub mod store;

pub use connection::{ConnectionManager, SessionHandle};
pub use error::{LoadError, StoreError};
pub use loader::{BatchCommit, BatchFailure, BatchLoader, BatchOutcome};
pub use memory::{FaultPlan, MemoryStore};
pub use mysql::MySqlConnector;
pub use orchestrator::{Orchestrator, RunOptions, RunState, RunSummary};
pub use postgres::PostgresConnector;
pub use retry::{Backoff, RetryPolicy, Sleeper, TokioSleeper};
pub use store::{Connector, Session};
