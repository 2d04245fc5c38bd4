use modgate_core::settings::SettingsUpdate;

use crate::util::{api_request, exit_error};

pub async fn show(api_url: &str, token: &str, guild_id: u64) -> i32 {
    api_request(
        api_url,
        reqwest::Method::GET,
        &format!("/v1/guilds/{guild_id}/settings"),
        Some(token),
        None,
    )
    .await
}

pub async fn status(api_url: &str, token: &str, guild_id: u64) -> i32 {
    api_request(
        api_url,
        reqwest::Method::GET,
        &format!("/v1/guilds/{guild_id}/status"),
        Some(token),
        None,
    )
    .await
}

pub async fn toggle(api_url: &str, token: &str, guild_id: u64) -> i32 {
    api_request(
        api_url,
        reqwest::Method::POST,
        &format!("/v1/guilds/{guild_id}/toggle"),
        Some(token),
        None,
    )
    .await
}

pub async fn set(api_url: &str, token: &str, guild_id: u64, update: SettingsUpdate) -> i32 {
    if update == SettingsUpdate::default() {
        exit_error(
            "Nothing to update",
            Some("Pass at least one of --enabled, --model, --context-messages, --confirm-enabled, --confirm-timeout, --confirm-actions, --proactive-chance."),
        );
    }
    let body = serde_json::to_value(&update)
        .unwrap_or_else(|e| exit_error(&format!("Failed to encode update: {e}"), None));
    api_request(
        api_url,
        reqwest::Method::PATCH,
        &format!("/v1/guilds/{guild_id}/settings"),
        Some(token),
        Some(body),
    )
    .await
}

/// Split a comma-separated tool list. An empty string clears the subset.
pub fn parse_tool_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tool| !tool.is_empty())
        .map(str::to_string)
        .collect()
}
