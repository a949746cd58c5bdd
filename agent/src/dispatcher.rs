//! The Dispatcher and Worker Pool: periodically drains the Snapshot Store
//! into fixed-size batches and hands them to a bounded queue that
//! `RateLimit` worker tasks drain concurrently.

use crate::sender::BatchSender;
use crate::store::SnapshotStore;
use metrics_core::RetryPolicy;
use metrics_model::MetricPoint;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct Dispatcher {
    store: Arc<SnapshotStore>,
    batch_size: usize,
    queue_tx: mpsc::Sender<Vec<MetricPoint>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns `rate_limit` worker tasks against a queue of capacity
    /// `rate_limit`, matching the contract that the job queue's capacity
    /// equals worker fan-out.
    pub fn new(
        store: Arc<SnapshotStore>,
        sender: Arc<BatchSender>,
        batch_size: usize,
        rate_limit: usize,
        policy: RetryPolicy,
    ) -> Self {
        let rate_limit = rate_limit.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(rate_limit);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let policy = Arc::new(policy);

        let workers = (0..rate_limit)
            .map(|worker_id| {
                let queue_rx = queue_rx.clone();
                let sender = sender.clone();
                let policy = policy.clone();
                tokio::spawn(async move {
                    loop {
                        let next = { queue_rx.lock().await.recv().await };
                        let Some(batch) = next else {
                            break;
                        };
                        match sender.send(batch, &policy).await {
                            Ok(()) => info!(worker_id, "batch delivered"),
                            Err(err) => {
                                error!(worker_id, attempts = err.attempts(), error = %err, "batch send failed terminally")
                            }
                        }
                    }
                })
            })
            .collect();

        Self {
            store,
            batch_size,
            queue_tx,
            workers,
        }
    }

    /// One report tick: snapshot, partition, offer each batch
    /// non-blockingly (dropping on saturation), then reset `PollCount`
    /// unconditionally.
    ///
    /// This is a known, documented quirk: a batch dropped for queue
    /// saturation still causes its `PollCount` contribution to be lost,
    /// rather than resent next tick. Gauges tolerate this because they're
    /// idempotent; `PollCount` does not, and this bounds the counter
    /// rather than guaranteeing its delivery.
    pub async fn report(&self) {
        let snapshot = self.store.snapshot().await;
        let mut dropped = 0usize;

        for chunk in snapshot.chunks(self.batch_size.max(1)) {
            if let Err(err) = self.queue_tx.try_send(chunk.to_vec()) {
                dropped += 1;
                warn!(error = %err, "worker queue saturated, dropping batch");
            }
        }

        if dropped > 0 {
            warn!(dropped, "batches dropped this report tick");
        }

        self.store.reset_poll_count().await;
    }

    /// Closes the job queue, signaling every worker to exit once its
    /// current batch (if any) completes, then joins them all.
    pub async fn shutdown(self) {
        drop(self.queue_tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn spawn_counting_server() -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = count.clone();
        let app = Router::new().route(
            "/updates/",
            post(move || {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    "{}"
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/updates/"), count)
    }

    #[tokio::test]
    async fn report_resets_poll_count_even_though_it_also_delivers() {
        let (url, _count) = spawn_counting_server().await;
        let store = Arc::new(SnapshotStore::new());
        store.publish_round(vec![MetricPoint::gauge("Alloc", 1.0)]).await;

        let sender = Arc::new(BatchSender::new(url, None));
        let dispatcher = Dispatcher::new(store.clone(), sender, 10, 2, RetryPolicy::standard());

        dispatcher.report().await;
        // give the worker a moment to drain the one batch offered
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snapshot = store.snapshot().await;
        let poll_count = snapshot.iter().find(|p| p.id == "PollCount").unwrap();
        assert_eq!(poll_count.delta, Some(0));

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn queue_saturation_drops_batches_without_blocking_report() {
        // A single, permanently-busy worker plus a tiny batch size gives
        // us many more batches than queue capacity, so some must be
        // dropped; `report` must still return promptly.
        let (url, _count) = spawn_counting_server().await;
        let store = Arc::new(SnapshotStore::new());
        let many_points: Vec<_> = (0..50)
            .map(|i| MetricPoint::gauge(format!("G{i}"), i as f64))
            .collect();
        store.publish_round(many_points).await;

        let sender = Arc::new(BatchSender::new(url, None));
        let dispatcher = Dispatcher::new(store.clone(), sender, 1, 1, RetryPolicy::standard());

        let started = std::time::Instant::now();
        dispatcher.report().await;
        assert!(started.elapsed() < std::time::Duration::from_secs(1));

        dispatcher.shutdown().await;
    }
}
