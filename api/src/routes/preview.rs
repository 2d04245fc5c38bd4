use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use modgate_core::actor::InboundRequest;
use modgate_engine::Preview;

use crate::auth::BridgeAuth;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/preview", post(preview_request))
}

/// Classify and authorize a request without executing anything.
#[utoipa::path(
    post,
    path = "/v1/preview",
    request_body = InboundRequest,
    responses(
        (status = 200, description = "Decision, resolved target and the gate verdict"),
        (status = 401, description = "Unauthorized", body = modgate_core::error::ApiError),
        (status = 422, description = "Target could not be resolved", body = modgate_core::error::ApiError),
        (status = 429, description = "Actor is rate limited", body = modgate_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "operator"
)]
pub async fn preview_request(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Json(request): Json<InboundRequest>,
) -> Result<Json<Preview>, AppError> {
    let settings = state.settings.load(request.origin.guild_id).await?;
    let preview = state.engine.preview(&request, &settings).await?;
    Ok(Json(preview))
}
