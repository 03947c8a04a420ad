//! hookrelay server: webhook fan-out and delivery.
//!
//! Wires the HTTP API and the delivery pipeline together: PostgreSQL for
//! durable records, Redis for the job queue and admission state, a fixed
//! worker pool fed by a polling dispatcher, and graceful shutdown bounded by
//! a deadline.

use std::net::SocketAddr;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod routes;

use config::ServerConfig;
use hookrelay_db::{run_migrations, DbPool, DbPoolOptions};
use hookrelay_delivery::{
    CircuitBreaker, Deliverer, Dispatcher, FanoutEngine, JobStore, Notifier, PostgresRecordStore,
    RateLimiter, RecordStore, RedisJobStore, WorkerPool,
};
use routes::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("Starting hookrelay v{}", VERSION);

    let config = ServerConfig::from_env()?;

    // Fatal startup: both stores must be reachable.
    let db = DbPool::connect(
        &config.database_url,
        DbPoolOptions {
            max_connections: config.db_max_connections,
            ..DbPoolOptions::default()
        },
    )
    .await?;
    run_migrations(&db).await?;
    info!("Connected to PostgreSQL");

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let mut redis_conn = ConnectionManager::new(redis_client).await?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut redis_conn)
        .await?;
    info!("Connected to Redis");

    let records: Arc<dyn RecordStore> = Arc::new(PostgresRecordStore::new(
        db.inner().clone(),
        config.pipeline.wildcard_scope,
    ));
    let jobs: Arc<dyn JobStore> = Arc::new(RedisJobStore::new(redis_conn.clone()));
    let notifier = Notifier::default();

    let breaker = CircuitBreaker::new(
        redis_conn.clone(),
        config.pipeline.breaker_threshold,
        config.pipeline.breaker_cooldown,
    );
    let limiter = RateLimiter::new(redis_conn.clone());

    let deliverer = Deliverer::new(
        Arc::clone(&records),
        Arc::clone(&jobs),
        notifier.clone(),
        &config.pipeline,
    )?
    .with_circuit_breaker(breaker.clone())
    .with_rate_limiter(limiter);

    let token = CancellationToken::new();
    let pool = WorkerPool::start(config.pipeline.worker_count, deliverer, token.clone());

    let dispatcher = Dispatcher::new(Arc::clone(&jobs), pool.submitter(), &config.pipeline);
    let dispatcher_handle = tokio::spawn(dispatcher.run(token.clone()));

    let fanout = Arc::new(FanoutEngine::new(
        Arc::clone(&records),
        Arc::clone(&jobs),
        &config.pipeline,
    ));

    let state = AppState {
        pool: db.inner().clone(),
        fanout,
        breaker,
        worker_count: config.pipeline.worker_count,
    };
    let app = routes::api_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(token.clone()))
        .await?;

    // The signal handler has already cancelled the token: the dispatcher
    // stops claiming and workers finish what they hold. Jobs still in the
    // queue wait for the next start or another replica.
    info!("Shutting down pipeline");
    let drained = tokio::time::timeout(config.pipeline.shutdown_deadline, async {
        let _ = dispatcher_handle.await;
        pool.stop().await;
    })
    .await;

    if drained.is_err() {
        error!(
            deadline_secs = config.pipeline.shutdown_deadline.as_secs(),
            "Shutdown deadline exceeded - abandoning in-flight work"
        );
    }

    db.close().await;
    info!("Server stopped");
    Ok(())
}

/// Initialize structured logging.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Wait for an interrupt and cancel the pipeline.
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
    token.cancel();
}
