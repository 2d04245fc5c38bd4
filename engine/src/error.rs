use modgate_core::error::codes;

use crate::gate::DenyReason;
use crate::provider::ProviderError;

/// Everything that can stop a request short of a completed action.
///
/// None of these are fatal: each one ends as a reply to the actor and the
/// routing loop keeps running.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModerationError {
    /// The model output could not be turned into an action.
    #[error("I couldn't comply with that request: {0}")]
    Routing(String),
    #[error("Permission denied: {0}")]
    Permission(DenyReason),
    #[error("Could not resolve target: {0}")]
    TargetResolution(String),
    #[error("{action} failed: {source}")]
    Provider {
        action: &'static str,
        #[source]
        source: ProviderError,
    },
    #[error("The action was not confirmed in time.")]
    ConfirmationExpired,
    #[error("Slow down! Try again in {retry_after_secs} second(s).")]
    RateLimited { retry_after_secs: u64 },
}

impl ModerationError {
    pub fn code(&self) -> &'static str {
        match self {
            ModerationError::Routing(_) => codes::ROUTING_FAILED,
            ModerationError::Permission(_) => codes::PERMISSION_DENIED,
            ModerationError::TargetResolution(_) => codes::TARGET_UNRESOLVED,
            ModerationError::Provider { .. } => codes::PROVIDER_ERROR,
            ModerationError::ConfirmationExpired => codes::CONFIRMATION_EXPIRED,
            ModerationError::RateLimited { .. } => codes::RATE_LIMITED,
        }
    }

    pub fn provider(action: &'static str, source: ProviderError) -> Self {
        ModerationError::Provider { action, source }
    }
}

/// Failure of a persistence collaborator (memory or audit store).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
