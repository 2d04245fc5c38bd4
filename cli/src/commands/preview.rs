use crate::util::{api_request, exit_error, read_json_input};

/// Dry-run an inbound request document (same shape the bridge posts to
/// `/v1/requests`).
pub async fn run(api_url: &str, token: &str, file: &str) -> i32 {
    let body = read_json_input(file).unwrap_or_else(|e| {
        exit_error(
            &e,
            Some("Pass a JSON InboundRequest file, or '-' to read it from stdin."),
        )
    });
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/preview",
        Some(token),
        Some(body),
    )
    .await
}
