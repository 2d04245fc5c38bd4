use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use modgate_core::actor::{Actor, Member, Origin};
use modgate_core::audit::{AuditRecord, AuditRecordBuilder};
use modgate_core::decision::{
    Arguments, Decision, TargetKind, Tool, argument_i64, argument_str, argument_u64,
};

use crate::error::ModerationError;
use crate::gate::{PermissionGate, Verdict};
use crate::provider::{ActionContext, ModerationProvider, ProviderError};

pub const TIMEOUT_MIN_SECONDS: u64 = 60;
pub const TIMEOUT_MAX_SECONDS: u64 = 259_200;
pub const TIMEOUT_DEFAULT_SECONDS: u64 = 3_600;
pub const BAN_DELETE_DAYS_MAX: u8 = 7;
pub const PURGE_MIN: u32 = 1;
pub const PURGE_MAX: u32 = 500;
pub const PURGE_DEFAULT: u32 = 10;

const DEFAULT_REASON: &str = "No reason provided";
const UNTIMEOUT_REASON: &str = "Timeout removed";
const UNBAN_REASON: &str = "Unbanned";
const PURGE_REASON: &str = "AI Moderation purge";

pub const HELP_TEXT: &str = "\
Mention me with what you need, in plain words.

Moderation (needs the matching permission):
- warn @user for <reason>
- timeout / mute @user for 1h
- untimeout / unmute @user
- kick @user
- ban @user (optionally: delete 2 days of messages)
- unban <user id>
- purge / clear 20 messages

Anything else is just conversation.

Operators with Manage Server can toggle the assistant, pick the model, set the context window and configure confirmations for ban, kick and purge.";

/// Timeout length from the model's arguments, clamped to the platform range.
pub fn timeout_seconds(arguments: &Arguments) -> u64 {
    argument_i64(arguments, "seconds")
        .map(|seconds| seconds.clamp(TIMEOUT_MIN_SECONDS as i64, TIMEOUT_MAX_SECONDS as i64) as u64)
        .unwrap_or(TIMEOUT_DEFAULT_SECONDS)
}

pub fn ban_delete_days(arguments: &Arguments) -> u8 {
    argument_i64(arguments, "delete_message_days")
        .map(|days| days.clamp(0, i64::from(BAN_DELETE_DAYS_MAX)) as u8)
        .unwrap_or(0)
}

pub fn purge_amount(arguments: &Arguments) -> u32 {
    argument_i64(arguments, "amount")
        .map(|amount| amount.clamp(i64::from(PURGE_MIN), i64::from(PURGE_MAX)) as u32)
        .unwrap_or(PURGE_DEFAULT)
}

/// Reason for the action, with the per-tool default when the model gave none.
pub fn action_reason(tool: Tool, arguments: &Arguments) -> String {
    if let Some(reason) = argument_str(arguments, "reason") {
        return reason.to_string();
    }
    match tool {
        Tool::RemoveTimeout => UNTIMEOUT_REASON,
        Tool::Unban => UNBAN_REASON,
        Tool::Purge => PURGE_REASON,
        _ => DEFAULT_REASON,
    }
    .to_string()
}

/// Who is acting, where, and on which request.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub actor: Actor,
    pub origin: Origin,
    /// Original request text, echoed redacted into the audit record.
    pub request_content: String,
    /// Set when the action runs after a confirmation by `actor`.
    pub requested_by: Option<u64>,
}

/// A finished action: the reply for the actor and, for side-effecting
/// tools, the audit record.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub tool: Tool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditRecord>,
}

/// Executes validated decisions through the moderation provider.
pub struct ActionDispatcher {
    provider: Arc<dyn ModerationProvider>,
    gate: PermissionGate,
    provider_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(provider: Arc<dyn ModerationProvider>, gate: PermissionGate, provider_timeout: Duration) -> Self {
        Self {
            provider,
            gate,
            provider_timeout,
        }
    }

    /// Resolve the decision's target. `Ok(None)` for tools without a member
    /// target.
    pub async fn resolve_target(
        &self,
        tool: Tool,
        arguments: &Arguments,
        guild_id: u64,
    ) -> Result<Option<Member>, ModerationError> {
        if tool.target_kind() != TargetKind::Member {
            return Ok(None);
        }
        let user_id = argument_u64(arguments, "target_user_id").ok_or_else(|| {
            ModerationError::TargetResolution("no target user was given".to_string())
        })?;
        let member = self
            .guarded("resolve_member", self.provider.resolve_member(guild_id, user_id))
            .await?;
        member
            .map(Some)
            .ok_or_else(|| ModerationError::TargetResolution(format!("user {user_id} is not a member of this server")))
    }

    /// Run one tool. Target and permissions are checked again here so an
    /// action that waited on confirmation sees the current state.
    pub async fn dispatch(
        &self,
        tool: Tool,
        arguments: &Arguments,
        decision: &Decision,
        ctx: &DispatchContext,
    ) -> Result<Dispatched, ModerationError> {
        let target = self.resolve_target(tool, arguments, ctx.origin.guild_id).await?;
        if let Verdict::Deny(reason) = self.gate.authorize(&ctx.actor, target.as_ref(), tool) {
            return Err(ModerationError::Permission(reason));
        }

        let reason = action_reason(tool, arguments);
        let action = ActionContext::new(
            ctx.origin.guild_id,
            ctx.origin.channel_id,
            ctx.actor.id,
            &ctx.actor.display_name,
            &reason,
        );
        let audit = self.audit_builder(tool, decision, ctx).reason(reason.clone());

        let dispatched = match (tool, target.as_ref()) {
            (Tool::ShowHelp, _) => Dispatched {
                tool,
                message: HELP_TEXT.to_string(),
                audit: None,
            },
            (Tool::Warn, Some(target)) => {
                self.guarded(tool.as_str(), self.provider.warn(&action, target)).await?;
                Dispatched {
                    tool,
                    message: format!("{} has been warned. Reason: {reason}", target.display_name),
                    audit: Some(audit.target(target.id).build()),
                }
            }
            (Tool::Timeout, Some(target)) => {
                let seconds = timeout_seconds(arguments);
                self.guarded(
                    tool.as_str(),
                    self.provider.timeout(&action, target, Duration::from_secs(seconds)),
                )
                .await?;
                Dispatched {
                    tool,
                    message: format!(
                        "{} has been timed out for {} minute(s). Reason: {reason}",
                        target.display_name,
                        seconds / 60
                    ),
                    audit: Some(audit.target(target.id).extra("duration_seconds", seconds).build()),
                }
            }
            (Tool::RemoveTimeout, Some(target)) => {
                self.guarded(tool.as_str(), self.provider.remove_timeout(&action, target))
                    .await?;
                Dispatched {
                    tool,
                    message: format!("{} is no longer timed out.", target.display_name),
                    audit: Some(audit.target(target.id).build()),
                }
            }
            (Tool::Kick, Some(target)) => {
                self.guarded(tool.as_str(), self.provider.kick(&action, target)).await?;
                Dispatched {
                    tool,
                    message: format!("{} has been kicked. Reason: {reason}", target.display_name),
                    audit: Some(audit.target(target.id).build()),
                }
            }
            (Tool::Ban, Some(target)) => {
                let delete_days = ban_delete_days(arguments);
                self.guarded(tool.as_str(), self.provider.ban(&action, target, delete_days))
                    .await?;
                Dispatched {
                    tool,
                    message: format!("{} has been banned. Reason: {reason}", target.display_name),
                    audit: Some(
                        audit
                            .target(target.id)
                            .extra("delete_message_days", delete_days)
                            .build(),
                    ),
                }
            }
            (Tool::Unban, _) => {
                let user_id = argument_u64(arguments, "target_user_id").ok_or_else(|| {
                    ModerationError::TargetResolution("no user id to unban was given".to_string())
                })?;
                self.guarded(tool.as_str(), self.provider.unban(&action, user_id))
                    .await?;
                Dispatched {
                    tool,
                    message: format!("User {user_id} has been unbanned."),
                    audit: Some(audit.target(user_id).build()),
                }
            }
            (Tool::Purge, _) => {
                let amount = purge_amount(arguments);
                let deleted = self
                    .guarded(tool.as_str(), self.provider.purge(&action, amount))
                    .await?;
                Dispatched {
                    tool,
                    message: format!("Deleted {deleted} message(s)."),
                    audit: Some(
                        audit
                            .extra("requested_amount", amount)
                            .extra("deleted_count", deleted)
                            .build(),
                    ),
                }
            }
            (Tool::Warn | Tool::Timeout | Tool::RemoveTimeout | Tool::Kick | Tool::Ban, None) => {
                return Err(ModerationError::TargetResolution(
                    "no target user was given".to_string(),
                ));
            }
        };

        tracing::info!(
            tool = tool.as_str(),
            actor_id = ctx.actor.id,
            guild_id = ctx.origin.guild_id,
            "moderation action executed"
        );
        Ok(dispatched)
    }

    fn audit_builder(&self, tool: Tool, decision: &Decision, ctx: &DispatchContext) -> AuditRecordBuilder {
        let builder = AuditRecord::builder(tool, ctx.actor.id, &ctx.origin)
            .request(&ctx.request_content)
            .decision(decision);
        match ctx.requested_by {
            Some(requested_by) => builder
                .extra("requested_by", requested_by.to_string())
                .extra("confirmed_by", ctx.actor.id.to_string()),
            None => builder,
        }
    }

    /// Bound a provider call by the configured timeout and map its failure.
    async fn guarded<T>(
        &self,
        action: &'static str,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ModerationError> {
        let result = match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(self.provider_timeout)),
        };
        result.map_err(|err| {
            tracing::warn!(action = action, error = %err, "moderation provider call failed");
            ModerationError::provider(action, err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> Arguments {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Arguments::new(),
        }
    }

    #[test]
    fn timeout_is_clamped_both_ways() {
        assert_eq!(timeout_seconds(&args(json!({"seconds": 99_999_999}))), 259_200);
        assert_eq!(timeout_seconds(&args(json!({"seconds": 5}))), 60);
        assert_eq!(timeout_seconds(&args(json!({"seconds": -20}))), 60);
        assert_eq!(timeout_seconds(&args(json!({"seconds": "7200"}))), 7200);
        assert_eq!(timeout_seconds(&args(json!({"seconds": "soon"}))), 3600);
        assert_eq!(timeout_seconds(&args(json!({}))), 3600);
    }

    #[test]
    fn ban_delete_days_and_purge_amount_are_clamped() {
        assert_eq!(ban_delete_days(&args(json!({"delete_message_days": 30}))), 7);
        assert_eq!(ban_delete_days(&args(json!({"delete_message_days": -1}))), 0);
        assert_eq!(ban_delete_days(&args(json!({}))), 0);
        assert_eq!(purge_amount(&args(json!({"amount": 0}))), 1);
        assert_eq!(purge_amount(&args(json!({"amount": 10_000}))), 500);
        assert_eq!(purge_amount(&args(json!({"amount": [1]}))), 10);
    }

    #[test]
    fn reasons_fall_back_per_tool() {
        let empty = Arguments::new();
        assert_eq!(action_reason(Tool::Warn, &empty), "No reason provided");
        assert_eq!(action_reason(Tool::RemoveTimeout, &empty), "Timeout removed");
        assert_eq!(action_reason(Tool::Unban, &empty), "Unbanned");
        assert_eq!(action_reason(Tool::Purge, &empty), "AI Moderation purge");
        assert_eq!(action_reason(Tool::Kick, &args(json!({"reason": " raid "}))), "raid");
    }
}
