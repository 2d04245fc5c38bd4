use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use modgate_core::error::{self, ApiError};
use modgate_core::settings::SettingsError;
use modgate_engine::ModerationError;
use modgate_engine::confirmation::{ConfirmationRejection, ConfirmationState};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid bearer token (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Authenticated, but not allowed to do this (403)
    Forbidden { message: String },
    /// Resource not found (404)
    NotFound { resource: String },
    /// Confirmation exists but is already resolved (409)
    NotActionable { message: String },
    /// Routing or authorization failure surfaced by the engine
    Moderation(ModerationError),
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    fn status_and_body(self, request_id: String) -> (StatusCode, ApiError) {
        let plain = |status: StatusCode, code: &str, message: String| {
            (
                status,
                ApiError {
                    error: code.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id: request_id.clone(),
                    docs_hint: None,
                    retry_after_secs: None,
                },
            )
        };

        match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id: request_id.clone(),
                    docs_hint,
                    retry_after_secs: None,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id: request_id.clone(),
                    docs_hint,
                    retry_after_secs: None,
                },
            ),
            AppError::Forbidden { message } => {
                plain(StatusCode::FORBIDDEN, error::codes::FORBIDDEN, message)
            }
            AppError::NotFound { resource } => plain(
                StatusCode::NOT_FOUND,
                error::codes::NOT_FOUND,
                format!("{resource} not found"),
            ),
            AppError::NotActionable { message } => plain(
                StatusCode::CONFLICT,
                error::codes::CONFIRMATION_NOT_ACTIONABLE,
                message,
            ),
            AppError::Moderation(err) => {
                let status = moderation_status(&err);
                let (status, mut body) = plain(status, err.code(), err.to_string());
                if let ModerationError::RateLimited { retry_after_secs } = err {
                    body.retry_after_secs = Some(retry_after_secs);
                }
                (status, body)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error::codes::INTERNAL_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error::codes::INTERNAL_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        }
    }
}

fn moderation_status(err: &ModerationError) -> StatusCode {
    match err {
        ModerationError::Routing(_) | ModerationError::TargetResolution(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ModerationError::Permission(_) => StatusCode::FORBIDDEN,
        ModerationError::Provider { .. } => StatusCode::BAD_GATEWAY,
        ModerationError::ConfirmationExpired => StatusCode::CONFLICT,
        ModerationError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let (status, api_error) = self.status_and_body(request_id);
        let retry_after = api_error.retry_after_secs;

        let mut response = (status, Json(api_error)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(secs),
            );
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<ModerationError> for AppError {
    fn from(err: ModerationError) -> Self {
        AppError::Moderation(err)
    }
}

impl From<ConfirmationRejection> for AppError {
    fn from(rejection: ConfirmationRejection) -> Self {
        match rejection {
            ConfirmationRejection::NotAuthorized => AppError::Forbidden {
                message: rejection.to_string(),
            },
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Expired) => {
                AppError::Moderation(ModerationError::ConfirmationExpired)
            }
            ConfirmationRejection::NoLongerActionable(_) => AppError::NotActionable {
                message: rejection.to_string(),
            },
            ConfirmationRejection::NotFound => AppError::NotFound {
                resource: "Confirmation".to_string(),
            },
        }
    }
}

impl From<SettingsError> for AppError {
    fn from(err: SettingsError) -> Self {
        AppError::Validation {
            field: Some(err.field().to_string()),
            message: err.to_string(),
            received: None,
            docs_hint: Some(
                "context_messages 0-30, confirm_timeout_seconds 5-120, proactive_chance 0.0-1.0, \
                 confirm_actions from the tool list."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> (StatusCode, ApiError) {
        err.status_and_body("req".to_string())
    }

    #[test]
    fn rejections_map_to_distinct_statuses() {
        let (status, body) = status_of(ConfirmationRejection::NotAuthorized.into());
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.message, "This confirmation is not for you.");

        let (status, body) = status_of(
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Confirmed).into(),
        );
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, error::codes::CONFIRMATION_NOT_ACTIONABLE);
        assert_eq!(body.message, "This confirmation is no longer actionable (confirmed).");

        let (status, body) = status_of(
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Expired).into(),
        );
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, error::codes::CONFIRMATION_EXPIRED);
        assert_eq!(body.message, "The action was not confirmed in time.");

        let (status, _) = status_of(ConfirmationRejection::NotFound.into());
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let (status, body) = status_of(AppError::Moderation(ModerationError::RateLimited {
            retry_after_secs: 7,
        }));
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.retry_after_secs, Some(7));
        assert_eq!(body.error, error::codes::RATE_LIMITED);
    }

    #[test]
    fn settings_errors_name_the_field() {
        let (status, body) = status_of(SettingsError::ConfirmTimeoutOutOfRange(500).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.field.as_deref(), Some("confirm_timeout_seconds"));
    }
}
