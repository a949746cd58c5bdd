//! Postgres persistence for the Database storage backend.
//!
//! Every call here goes through the shared retry controller with
//! `metrics_core::db::classify` deciding what's worth retrying, and a hard
//! deadline via `tokio::time::timeout` so a wedged connection pool can't
//! stall a request indefinitely.

use metrics_core::db::classify;
use metrics_core::{retry, RetryError, RetryPolicy};
use metrics_model::{MetricKind, MetricPoint};
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;

const SINGLE_CALL_DEADLINE: Duration = Duration::from_secs(5);
const BATCH_CALL_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Query(#[from] sqlx::Error),
    #[error("database call exceeded its deadline")]
    Timeout,
}

impl metrics_core::Classify for DbError {
    fn category(&self) -> metrics_core::ErrorCategory {
        match self {
            DbError::Query(e) => classify(e),
            DbError::Timeout => metrics_core::ErrorCategory::Retriable,
        }
    }
}

fn kind_str(kind: MetricKind) -> &'static str {
    kind.as_str()
}

async fn upsert_one_once(pool: &PgPool, point: &MetricPoint) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO metrics (id, type, delta, value, hash, updated_at) \
         VALUES ($1, $2, $3, $4, $5, now()) \
         ON CONFLICT (id, type) DO UPDATE SET \
           delta = EXCLUDED.delta, value = EXCLUDED.value, hash = EXCLUDED.hash, updated_at = now()",
    )
    .bind(&point.id)
    .bind(kind_str(point.kind))
    .bind(point.delta)
    .bind(point.value)
    .bind(&point.hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_one(
    pool: &PgPool,
    point: &MetricPoint,
    policy: &RetryPolicy,
) -> Result<(), RetryError<DbError>> {
    retry(policy, || async {
        tokio::time::timeout(SINGLE_CALL_DEADLINE, upsert_one_once(pool, point))
            .await
            .unwrap_or(Err(DbError::Timeout))
    })
    .await
}

pub async fn upsert_batch(
    pool: &PgPool,
    points: &[MetricPoint],
    policy: &RetryPolicy,
) -> Result<(), RetryError<DbError>> {
    retry(policy, || async {
        tokio::time::timeout(BATCH_CALL_DEADLINE, async {
            let mut tx = pool.begin().await?;
            for point in points {
                sqlx::query(
                    "INSERT INTO metrics (id, type, delta, value, hash, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, now()) \
                     ON CONFLICT (id, type) DO UPDATE SET \
                       delta = EXCLUDED.delta, value = EXCLUDED.value, hash = EXCLUDED.hash, updated_at = now()",
                )
                .bind(&point.id)
                .bind(kind_str(point.kind))
                .bind(point.delta)
                .bind(point.value)
                .bind(&point.hash)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_or(Err(DbError::Timeout))
    })
    .await
}

pub async fn restore_all(pool: &PgPool) -> Result<Vec<MetricPoint>, DbError> {
    let rows: Vec<(String, String, Option<i64>, Option<f64>, Option<String>)> =
        sqlx::query_as("SELECT id, type, delta, value, hash FROM metrics")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, kind, delta, value, hash)| {
            let kind: MetricKind = kind.parse().ok()?;
            Some(MetricPoint { id, kind, delta, value, hash })
        })
        .collect())
}

pub async fn ping(pool: &PgPool) -> Result<(), DbError> {
    tokio::time::timeout(SINGLE_CALL_DEADLINE, async {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok::<_, sqlx::Error>(())
    })
    .await
    .map_err(|_| DbError::Timeout)?
    .map_err(DbError::Query)
}
