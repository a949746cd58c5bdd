//! The Snapshot Store: the agent's in-memory map from metric name to
//! latest typed point, guarded by a reader/writer lock so the dispatcher's
//! snapshot reads never block on (or are blocked by) an in-flight sampler
//! round for longer than copying the map takes.

use metrics_model::MetricPoint;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub const POLL_COUNT_ID: &str = "PollCount";

#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<HashMap<String, MetricPoint>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes one sampling round: upserts every point from the sampler
    /// and increments `PollCount` by one, all under a single write-lock
    /// acquisition so a concurrent `snapshot()` never observes half a
    /// round.
    pub async fn publish_round(&self, points: Vec<MetricPoint>) {
        let mut guard = self.inner.write().await;
        for point in points {
            guard.insert(point.id.clone(), point);
        }
        let poll_count = guard
            .entry(POLL_COUNT_ID.to_string())
            .or_insert_with(|| MetricPoint::counter(POLL_COUNT_ID, 0));
        let next = poll_count.delta.unwrap_or(0) + 1;
        poll_count.delta = Some(next);
    }

    /// A consistent copy of every stored point, taken under the read lock.
    pub async fn snapshot(&self) -> Vec<MetricPoint> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Resets `PollCount` to zero. Called unconditionally at report-dispatch
    /// time regardless of whether the batches built from this snapshot were
    /// actually delivered, see `Dispatcher::report`.
    pub async fn reset_poll_count(&self) {
        let mut guard = self.inner.write().await;
        if let Some(point) = guard.get_mut(POLL_COUNT_ID) {
            point.delta = Some(0);
        }
    }
}
