use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use modgate_core::auth::token_matches;

use crate::error::AppError;
use crate::state::AppState;

/// A caller holding the shared API token: the chat-platform bridge or an
/// operator using the CLI.
#[derive(Debug, Clone, Copy)]
pub struct BridgeAuth;

impl FromRequestParts<AppState> for BridgeAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
                docs_hint: Some(
                    "Include 'Authorization: Bearer <token>' with the value of MODGATE_API_TOKEN."
                        .to_string(),
                ),
            })?;

        let token = bearer_token(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header must use Bearer scheme".to_string(),
            docs_hint: Some("Format: 'Authorization: Bearer <token>'".to_string()),
        })?;

        if !token_matches(token, &state.api_token_hash) {
            tracing::warn!("rejected request with invalid API token");
            return Err(AppError::Unauthorized {
                message: "Invalid API token".to_string(),
                docs_hint: None,
            });
        }

        Ok(BridgeAuth)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}
