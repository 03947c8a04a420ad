//! `PostgreSQL` connection pooling.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::DbError;

/// Sizing and acquisition limits for the connection pool.
///
/// `max_connections` is operator-tunable (the server reads
/// `HOOKRELAY_DB_MAX_CONNECTIONS`); the rest are fixed defaults.
#[derive(Debug, Clone)]
pub struct DbPoolOptions {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for DbPoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// The shared `PostgreSQL` connection pool.
#[derive(Debug, Clone)]
pub struct DbPool {
    inner: PgPool,
}

impl DbPool {
    /// Connect to `PostgreSQL` with the given pool limits.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if no connection can be
    /// established.
    pub async fn connect(database_url: &str, options: DbPoolOptions) -> Result<Self, DbError> {
        let inner = PgPoolOptions::new()
            .min_connections(options.min_connections)
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;

        Ok(Self { inner })
    }

    /// The underlying `SQLx` pool, for queries and for handing to axum state.
    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.inner
    }

    /// Close every connection. Called once during shutdown.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}
