//! # hookrelay-db
//!
//! PostgreSQL record store for the hookrelay delivery service.
//!
//! Provides the durable persistence layer consumed by the delivery pipeline
//! and the HTTP API: subscribers and their event-type subscriptions, the
//! immutable event log, the append-only delivery attempt history, and the
//! dead letter queue for permanently failed deliveries.
//!
//! Models follow a one-file-per-table layout with `FromRow` structs and
//! runtime-checked queries, so no live database is needed at compile time.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolOptions};
