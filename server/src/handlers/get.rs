use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use metrics_model::{MetricKind, MetricPoint};
use std::str::FromStr;

pub async fn get_value_text(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let kind = MetricKind::from_str(&kind).map_err(|_| AppError::not_found("unknown metric kind"))?;
    let point = state
        .storage
        .get(&name, kind)
        .await
        .ok_or_else(|| AppError::not_found("metric not found"))?;
    point.format_value().ok_or_else(|| AppError::not_found("metric not found"))
}

pub async fn get_value_json(
    State(state): State<AppState>,
    Json(query): Json<MetricPoint>,
) -> AppResult<impl IntoResponse> {
    let point = state
        .storage
        .get(&query.id, query.kind)
        .await
        .ok_or_else(|| AppError::not_found("metric not found"))?;
    Ok(Json(point))
}
