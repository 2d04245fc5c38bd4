use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use modgate_core::actor::Member;

/// Failure class reported by the moderation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorClass {
    Forbidden,
    NotFound,
    Transient,
    Timeout,
}

impl ProviderErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorClass::Forbidden => "forbidden",
            ProviderErrorClass::NotFound => "not_found",
            ProviderErrorClass::Transient => "transient",
            ProviderErrorClass::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({message})", kind = .class.as_str())]
pub struct ProviderError {
    pub class: ProviderErrorClass,
    pub message: String,
}

impl ProviderError {
    pub fn new(class: ProviderErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorClass::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorClass::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorClass::Transient, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ProviderErrorClass::Timeout,
            format!("no response after {}s", after.as_secs()),
        )
    }

    /// Short user-facing explanation.
    pub fn user_message(&self) -> &'static str {
        match self.class {
            ProviderErrorClass::Forbidden => "I don't have permission to do that.",
            ProviderErrorClass::NotFound => "That user or message no longer exists.",
            ProviderErrorClass::Transient => "The chat platform rejected the request, try again later.",
            ProviderErrorClass::Timeout => "The chat platform did not answer in time.",
        }
    }
}

/// Where an action happens and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub guild_id: u64,
    pub channel_id: u64,
    pub moderator_id: u64,
    /// Reason as it should appear in the platform's own audit log.
    pub reason: String,
}

impl ActionContext {
    pub fn new(guild_id: u64, channel_id: u64, moderator_id: u64, moderator_name: &str, reason: &str) -> Self {
        Self {
            guild_id,
            channel_id,
            moderator_id,
            reason: provider_reason(moderator_name, reason),
        }
    }
}

/// Reason string attributed to the requesting moderator.
pub fn provider_reason(moderator_name: &str, reason: &str) -> String {
    format!("AI Mod ({moderator_name}): {reason}")
}

/// The side-effecting moderation capabilities of the chat platform.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// `Ok(None)` when the id is not a member of the guild.
    async fn resolve_member(&self, guild_id: u64, user_id: u64) -> Result<Option<Member>, ProviderError>;

    /// Warnings are recorded by the host; the provider only notifies.
    async fn warn(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError>;

    async fn timeout(&self, ctx: &ActionContext, target: &Member, duration: Duration) -> Result<(), ProviderError>;

    async fn remove_timeout(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError>;

    async fn kick(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError>;

    async fn ban(&self, ctx: &ActionContext, target: &Member, delete_message_days: u8) -> Result<(), ProviderError>;

    async fn unban(&self, ctx: &ActionContext, user_id: u64) -> Result<(), ProviderError>;

    /// Returns how many messages were actually deleted.
    async fn purge(&self, ctx: &ActionContext, amount: u32) -> Result<u32, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_attributed_to_moderator() {
        let ctx = ActionContext::new(1, 2, 3, "alice", "spam");
        assert_eq!(ctx.reason, "AI Mod (alice): spam");
    }

    #[test]
    fn error_display_includes_class() {
        let err = ProviderError::forbidden("missing permissions");
        assert_eq!(err.to_string(), "forbidden (missing permissions)");
        assert_eq!(
            ProviderError::timeout(Duration::from_secs(10)).class,
            ProviderErrorClass::Timeout
        );
    }
}
