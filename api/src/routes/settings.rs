use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use modgate_core::error::ApiError;
use modgate_core::settings::{GuildSettings, SettingsUpdate};
use modgate_engine::EngineStatus;

use crate::auth::BridgeAuth;
use crate::error::AppError;
use crate::state::AppState;

/// Attempts before a contended settings write gives up.
const SAVE_ATTEMPTS: usize = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/guilds/{guild_id}/settings",
            get(get_settings).patch(update_settings),
        )
        .route("/v1/guilds/{guild_id}/toggle", post(toggle))
        .route("/v1/guilds/{guild_id}/status", get(status))
}

/// Effective settings for a guild (defaults if never changed).
#[utoipa::path(
    get,
    path = "/v1/guilds/{guild_id}/settings",
    params(("guild_id" = u64, Path, description = "Guild id")),
    responses(
        (status = 200, description = "Current settings", body = GuildSettings),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "operator"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(guild_id): Path<u64>,
) -> Result<Json<GuildSettings>, AppError> {
    Ok(Json(state.settings.load(guild_id).await?))
}

/// Apply a partial update. The stored version is bumped on success.
#[utoipa::path(
    patch,
    path = "/v1/guilds/{guild_id}/settings",
    params(("guild_id" = u64, Path, description = "Guild id")),
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Updated settings", body = GuildSettings),
        (status = 400, description = "Out-of-range value or unknown tool", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "operator"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(guild_id): Path<u64>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<GuildSettings>, AppError> {
    let settings = save_with(&state, guild_id, |_| update.clone()).await?;
    Ok(Json(settings))
}

/// Flip `enabled` for a guild.
#[utoipa::path(
    post,
    path = "/v1/guilds/{guild_id}/toggle",
    params(("guild_id" = u64, Path, description = "Guild id")),
    responses(
        (status = 200, description = "Settings after the toggle", body = GuildSettings),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "operator"
)]
pub async fn toggle(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(guild_id): Path<u64>,
) -> Result<Json<GuildSettings>, AppError> {
    let settings = save_with(&state, guild_id, toggle_update).await?;
    Ok(Json(settings))
}

/// Settings plus engine state: model availability, effective model,
/// pending confirmations.
#[utoipa::path(
    get,
    path = "/v1/guilds/{guild_id}/status",
    params(("guild_id" = u64, Path, description = "Guild id")),
    responses(
        (status = 200, description = "Engine status for this guild"),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "operator"
)]
pub async fn status(
    State(state): State<AppState>,
    _auth: BridgeAuth,
    Path(guild_id): Path<u64>,
) -> Result<Json<EngineStatus>, AppError> {
    let settings = state.settings.load(guild_id).await?;
    Ok(Json(state.engine.status(&settings)))
}

fn toggle_update(current: &GuildSettings) -> SettingsUpdate {
    SettingsUpdate {
        enabled: Some(!current.enabled),
        ..SettingsUpdate::default()
    }
}

/// Load, apply and conditionally save, retrying when another writer
/// bumped the version in between.
async fn save_with<F>(state: &AppState, guild_id: u64, make_update: F) -> Result<GuildSettings, AppError>
where
    F: Fn(&GuildSettings) -> SettingsUpdate,
{
    for _ in 0..SAVE_ATTEMPTS {
        let current = state.settings.load(guild_id).await?;
        let next = current.apply(&make_update(&current))?;
        if state.settings.save(guild_id, &next).await? {
            tracing::info!(
                guild_id,
                version = next.version,
                enabled = next.enabled,
                "guild settings updated"
            );
            return Ok(next);
        }
        tracing::debug!(guild_id, "settings write lost a race, retrying");
    }
    Err(AppError::Internal(format!(
        "settings for guild {guild_id} kept changing during update"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_enabled_and_bumps_version() {
        let current = GuildSettings::default();
        let next = current.apply(&toggle_update(&current)).unwrap();
        assert!(!next.enabled);
        assert_eq!(next.version, current.version + 1);

        let again = next.apply(&toggle_update(&next)).unwrap();
        assert!(again.enabled);
    }
}
