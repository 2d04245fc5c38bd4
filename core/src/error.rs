use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured error body returned by the API and printed by the CLI.
/// Every error carries enough context for the bridge or an operator to
/// show the actor what went wrong and what to do next.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Seconds until the caller may retry (rate limits only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Error codes shared by the engine outcomes and the HTTP surface.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const ROUTING_FAILED: &str = "routing_failed";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const TARGET_UNRESOLVED: &str = "target_unresolved";
    pub const PROVIDER_ERROR: &str = "provider_error";
    pub const CONFIRMATION_EXPIRED: &str = "confirmation_expired";
    pub const CONFIRMATION_NOT_ACTIONABLE: &str = "confirmation_not_actionable";
}
