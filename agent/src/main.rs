//! # Metrics Agent
//!
//! Periodically samples process and host metrics and reports them to a
//! metrics server as signed, gzip-compressed JSON batches.
//!
//! ## Architecture
//!
//! - [`sampler`] reads host/process stats into the [`store::SnapshotStore`]
//!   on a poll tick.
//! - [`dispatcher`] drains the store into batches and hands them to a fixed
//!   pool of workers on a report tick.
//! - [`sender`] is what each worker uses to actually deliver a batch, wrapped
//!   in the shared retry controller from `metrics-core`.

mod config;
mod dispatcher;
mod sampler;
mod sender;
mod store;

use clap::Parser;
use config::Args;
use dispatcher::Dispatcher;
use metrics_core::RetryPolicy;
use sampler::Sampler;
use sender::BatchSender;
use std::sync::Arc;
use std::time::Duration;
use store::SnapshotStore;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let _ = dotenvy::dotenv();
    let args = Args::parse();

    info!(
        address = %args.address,
        poll_interval = args.poll_interval,
        report_interval = args.report_interval,
        rate_limit = args.rate_limit,
        keyed = args.key.is_some(),
        "agent starting"
    );

    let store = Arc::new(SnapshotStore::new());
    let sender = Arc::new(BatchSender::new(args.updates_url(), args.key.clone()));
    let dispatcher = Dispatcher::new(
        store.clone(),
        sender,
        args.batch_size,
        args.rate_limit,
        RetryPolicy::standard(),
    );

    let (shutdown_tx, mut poll_shutdown_rx) = tokio::sync::watch::channel(false);
    let mut report_shutdown_rx = shutdown_tx.subscribe();

    let mut sampler = Sampler::new();
    let poll_store = store.clone();
    let poll_interval = Duration::from_secs(args.poll_interval.max(1));
    let poll_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let points = sampler.collect();
                    poll_store.publish_round(points).await;
                }
                _ = poll_shutdown_rx.changed() => break,
            }
        }
    });

    let report_interval = Duration::from_secs(args.report_interval.max(1));
    let report_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => dispatcher.report().await,
                _ = report_shutdown_rx.changed() => break,
            }
        }
        dispatcher.shutdown().await;
    });

    signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight batches");
    let _ = shutdown_tx.send(true);
    let _ = poll_task.await;
    let _ = report_task.await;

    Ok(())
}
