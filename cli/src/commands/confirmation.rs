use serde_json::json;
use uuid::Uuid;

use crate::util::{api_request, exit_error, parse_json};

pub async fn show(api_url: &str, token: &str, id: Uuid) -> i32 {
    api_request(
        api_url,
        reqwest::Method::GET,
        &format!("/v1/confirmations/{id}"),
        Some(token),
        None,
    )
    .await
}

/// `actor` is the JSON snapshot of the confirming actor.
pub async fn confirm(api_url: &str, token: &str, id: Uuid, actor: &str) -> i32 {
    let actor = parse_json(actor, "--actor").unwrap_or_else(|e| {
        exit_error(
            &e,
            Some(r#"Example: --actor '{"id":1,"display_name":"mod","rank":10,"permissions":{"can_ban":true}}'"#),
        )
    });
    api_request(
        api_url,
        reqwest::Method::POST,
        &format!("/v1/confirmations/{id}/confirm"),
        Some(token),
        Some(json!({ "actor": actor })),
    )
    .await
}

pub async fn cancel(api_url: &str, token: &str, id: Uuid, actor_id: u64) -> i32 {
    api_request(
        api_url,
        reqwest::Method::POST,
        &format!("/v1/confirmations/{id}/cancel"),
        Some(token),
        Some(json!({ "actor_id": actor_id })),
    )
    .await
}
