//! # Metrics Server
//!
//! Ingests metric batches reported by agents, accumulates counters,
//! serves point queries, and optionally persists state to a file or a
//! Postgres database.
//!
//! ## Architecture
//!
//! - [`storage`] is the canonical in-memory catalog plus whichever
//!   persistence backend was configured.
//! - [`middleware`] wraps every request in compression, signature, and
//!   logging layers, in that order.
//! - [`handlers`] implement the HTTP surface described in `build_router`.
//! - [`audit`] fans batch-update events out to configured subscribers
//!   after a successful upsert.

pub mod audit;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod storage;

use anyhow::Context;
use audit::{AuditNotifier, AuditSubscriber, FileSubscriber, HttpSubscriber};
use axum::routing::{get, post};
use axum::Router;
use config::Args;
use metrics_core::RetryPolicy;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{Backend, FileMode, Storage};
use tracing::info;

pub async fn build_backend(args: &Args) -> anyhow::Result<Backend> {
    if let Some(dsn) = &args.database_dsn {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or_else(|| num_cpus::get() as u32);

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .context("connecting to the metrics database")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running database migrations")?;
        return Ok(Backend::Database { pool, policy: RetryPolicy::standard() });
    }

    if args.file_storage_path.is_empty() {
        return Ok(Backend::None);
    }

    let mode = if args.store_interval == 0 {
        FileMode::WriteThrough
    } else {
        FileMode::Periodic(Duration::from_secs(args.store_interval))
    };
    Ok(Backend::File { path: PathBuf::from(&args.file_storage_path), mode })
}

pub fn build_audit_notifier(args: &Args) -> AuditNotifier {
    let mut subscribers: Vec<Arc<dyn AuditSubscriber>> = Vec::new();
    if let Some(path) = &args.audit_file {
        subscribers.push(Arc::new(FileSubscriber::new(path)));
    }
    if let Some(url) = &args.audit_url {
        subscribers.push(Arc::new(HttpSubscriber::new(url.clone())));
    }
    AuditNotifier::new(subscribers)
}

/// Assembles the full middleware-wrapped router. Exposed so integration
/// tests can mount it against an in-process listener without going
/// through `run`'s CLI/env parsing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/update/{type}/{name}/{value}", post(handlers::update_path))
        .route("/update/", post(handlers::update_json))
        .route("/updates/", post(handlers::update_batch))
        .route("/value/{type}/{name}", get(handlers::get_value_text))
        .route("/value/", post(handlers::get_value_json))
        .route("/ping", get(handlers::ping))
        .route("/", get(handlers::index))
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::signature_middleware))
        .layer(axum::middleware::from_fn(middleware::compression_middleware))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// The binary's entire startup sequence: build the storage backend,
/// restore prior state, assemble the router, and serve until shutdown.
pub async fn run(args: Args) -> anyhow::Result<()> {
    info!(
        address = %args.address,
        store_interval = args.store_interval,
        file_storage_path = %args.file_storage_path,
        restore = args.restore,
        database = args.database_dsn.is_some(),
        keyed = args.key.is_some(),
        "server starting"
    );

    let backend = build_backend(&args).await?;
    let storage = Arc::new(Storage::new(backend));

    if args.restore {
        match storage.restore().await {
            Ok(count) => info!(count, "restored metrics from persistence backend"),
            Err(err) => tracing::warn!(error = %err, "failed to restore metrics, starting empty"),
        }
    }

    let periodic_storage = storage.clone();
    tokio::spawn(async move { periodic_storage.run_periodic_flush().await });

    let state = AppState {
        storage: storage.clone(),
        audit: build_audit_notifier(&args),
        hmac_key: args.key.clone().map(|k| Arc::new(k.into_bytes())),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.bind_addr())
        .await
        .with_context(|| format!("binding {}", args.bind_addr()))?;

    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(err) = storage.flush().await {
        tracing::warn!(error = %err, "final flush on shutdown failed");
    }

    Ok(())
}
