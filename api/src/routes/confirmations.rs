use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use modgate_core::actor::Actor;
use modgate_core::error::ApiError;
use modgate_engine::Outcome;
use modgate_engine::confirmation::ConfirmationRequest;

use crate::auth::BridgeAuth;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/confirmations/{id}", get(get_confirmation))
        .route("/v1/confirmations/{id}/confirm", post(confirm))
        .route("/v1/confirmations/{id}/cancel", post(cancel))
}

/// The actor who pressed the confirm button, as currently known to the bridge.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmBody {
    pub actor: Actor,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelBody {
    pub actor_id: u64,
}

/// Look up a confirmation while it is pending or recently resolved.
#[utoipa::path(
    get,
    path = "/v1/confirmations/{id}",
    params(("id" = Uuid, Path, description = "Confirmation id")),
    responses(
        (status = 200, description = "The confirmation request and its summary"),
        (status = 404, description = "Unknown or pruned confirmation", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "confirmations"
)]
pub async fn get_confirmation(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<ConfirmationRequest>, AppError> {
    state
        .engine
        .confirmation(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            resource: format!("Confirmation {id}"),
        })
}

/// Approve a pending confirmation and execute the action.
#[utoipa::path(
    post,
    path = "/v1/confirmations/{id}/confirm",
    params(("id" = Uuid, Path, description = "Confirmation id")),
    request_body = ConfirmBody,
    responses(
        (status = 200, description = "Outcome of the executed action"),
        (status = 403, description = "Actor may not confirm this request", body = ApiError),
        (status = 404, description = "Unknown confirmation", body = ApiError),
        (status = 409, description = "Already confirmed, cancelled or expired", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "confirmations"
)]
pub async fn confirm(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<Outcome>, AppError> {
    let outcome = state.engine.confirm(id, &body.actor).await?;
    tracing::info!(confirmation_id = %id, actor_id = body.actor.id, "confirmation approved");
    Ok(Json(outcome))
}

/// Cancel a pending confirmation.
#[utoipa::path(
    post,
    path = "/v1/confirmations/{id}/cancel",
    params(("id" = Uuid, Path, description = "Confirmation id")),
    request_body = CancelBody,
    responses(
        (status = 200, description = "Cancelled"),
        (status = 403, description = "Actor may not cancel this request", body = ApiError),
        (status = 404, description = "Unknown confirmation", body = ApiError),
        (status = 409, description = "Already confirmed, cancelled or expired", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "confirmations"
)]
pub async fn cancel(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Outcome>, AppError> {
    let outcome = state.engine.cancel(id, body.actor_id)?;
    tracing::info!(confirmation_id = %id, actor_id = body.actor_id, "confirmation cancelled");
    Ok(Json(outcome))
}
