use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;

pub async fn ping(State(state): State<AppState>) -> StatusCode {
    match state.storage.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "ping failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
