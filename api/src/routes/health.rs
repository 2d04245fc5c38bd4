use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};

use crate::HealthResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Database reachability decides liveness. A missing model key keeps the
/// service up but every request would fail routing, so it reports degraded.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Serving; `degraded` when the model is not configured", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();
    let model_configured = state.engine.model_configured();
    let (http_status, status) = classify(db_ok, model_configured);

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_ok,
            model_configured,
            pending_confirmations: state.engine.pending_confirmations(),
        }),
    )
}

fn classify(db_ok: bool, model_configured: bool) -> (StatusCode, &'static str) {
    match (db_ok, model_configured) {
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
        (true, false) => (StatusCode::OK, "degraded"),
        (true, true) => (StatusCode::OK, "ok"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_decides_liveness_and_model_decides_degradation() {
        assert_eq!(classify(true, true), (StatusCode::OK, "ok"));
        assert_eq!(classify(true, false), (StatusCode::OK, "degraded"));
        assert_eq!(classify(false, true), (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"));
    }
}
