use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use modgate_core::actor::InboundRequest;
use modgate_engine::Outcome;

use crate::auth::BridgeAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/requests", post(handle_request))
}

/// Route one inbound chat message through the engine.
///
/// Always answers 200 with an outcome tagged by `outcome`; refusals,
/// rate limits and provider failures are outcomes, not HTTP errors.
#[utoipa::path(
    post,
    path = "/v1/requests",
    request_body = InboundRequest,
    responses(
        (status = 200, description = "Outcome: ignored, help, reply, rate_limited, failed, awaiting_confirmation, completed"),
        (status = 400, description = "Malformed request", body = modgate_core::error::ApiError),
        (status = 401, description = "Unauthorized", body = modgate_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "requests"
)]
pub async fn handle_request(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Json(request): Json<InboundRequest>,
) -> Json<Outcome> {
    let settings = state.settings.load_or_default(request.origin.guild_id).await;
    let outcome = state.engine.handle(&request, &settings).await;
    Json(outcome)
}
