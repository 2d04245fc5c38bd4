use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::actor::Origin;
use crate::auth::hash_token;
use crate::decision::{Decision, Tool};

/// Longest request excerpt kept in an audit record.
pub const REQUEST_ECHO_MAX_CHARS: usize = 400;
const TRUNCATION_MARKER: &str = "…truncated";

static USER_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@!?\d+>").expect("valid user mention regex"));
static ROLE_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@&\d+>").expect("valid role mention regex"));

/// Redacted copy of the request that produced an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RequestEcho {
    /// Mention tokens replaced, cut to `REQUEST_ECHO_MAX_CHARS`.
    pub excerpt: String,
    pub truncated: bool,
    /// SHA-256 of the full original text, for correlation without the text.
    pub sha256: String,
}

impl RequestEcho {
    pub fn redact(content: &str) -> Self {
        let redacted = USER_MENTION_RE.replace_all(content, "@user");
        let redacted = ROLE_MENTION_RE.replace_all(&redacted, "@role");
        let truncated = redacted.chars().count() > REQUEST_ECHO_MAX_CHARS;
        let excerpt = if truncated {
            let mut cut: String = redacted.chars().take(REQUEST_ECHO_MAX_CHARS).collect();
            cut.push('\n');
            cut.push_str(TRUNCATION_MARKER);
            cut
        } else {
            redacted.into_owned()
        };
        Self {
            excerpt,
            truncated,
            sha256: hash_token(content),
        }
    }
}

/// Uniform record of one executed moderation action. Built once by the
/// dispatcher, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub guild_id: u64,
    pub channel_id: u64,
    /// Tool wire name, e.g. `ban_member`.
    pub action: String,
    pub actor_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u64>,
    pub reason: String,
    #[schema(value_type = Object)]
    pub extra: BTreeMap<String, Value>,
    pub request: RequestEcho,
    /// Compact JSON of the decision that produced the action.
    pub decision: String,
}

impl AuditRecord {
    pub fn builder(tool: Tool, actor_id: u64, origin: &Origin) -> AuditRecordBuilder {
        AuditRecordBuilder {
            action: tool.as_str().to_string(),
            actor_id,
            origin: *origin,
            target_id: None,
            reason: String::new(),
            extra: BTreeMap::new(),
            request: None,
            decision: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditRecordBuilder {
    action: String,
    actor_id: u64,
    origin: Origin,
    target_id: Option<u64>,
    reason: String,
    extra: BTreeMap<String, Value>,
    request: Option<RequestEcho>,
    decision: Option<String>,
}

impl AuditRecordBuilder {
    pub fn target(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn request(mut self, content: &str) -> Self {
        self.request = Some(RequestEcho::redact(content));
        self
    }

    pub fn decision(mut self, decision: &Decision) -> Self {
        self.decision = Some(decision.compact());
        self
    }

    pub fn build(self) -> AuditRecord {
        AuditRecord {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
            guild_id: self.origin.guild_id,
            channel_id: self.origin.channel_id,
            action: self.action,
            actor_id: self.actor_id,
            target_id: self.target_id,
            reason: self.reason,
            extra: self.extra,
            request: self.request.unwrap_or_else(|| RequestEcho::redact("")),
            decision: self.decision.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Arguments;

    #[test]
    fn echo_redacts_mentions_and_keeps_digest_of_original() {
        let original = "<@7> ban <@!42> and ping <@&99>";
        let echo = RequestEcho::redact(original);
        assert_eq!(echo.excerpt, "@user ban @user and ping @role");
        assert!(!echo.truncated);
        assert_eq!(echo.sha256, hash_token(original));
    }

    #[test]
    fn echo_truncates_long_requests() {
        let original = "x".repeat(REQUEST_ECHO_MAX_CHARS + 50);
        let echo = RequestEcho::redact(&original);
        assert!(echo.truncated);
        assert!(echo.excerpt.ends_with(TRUNCATION_MARKER));
        assert!(echo.excerpt.starts_with(&"x".repeat(REQUEST_ECHO_MAX_CHARS)));
    }

    #[test]
    fn builder_captures_target_extras_and_decision() {
        let origin = Origin {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
        };
        let decision = Decision::tool_call(Tool::Timeout, Arguments::new(), "spam");
        let record = AuditRecord::builder(Tool::Timeout, 5, &origin)
            .target(42)
            .reason("spam")
            .extra("duration_seconds", 600)
            .request("timeout <@42>")
            .decision(&decision)
            .build();
        assert_eq!(record.action, "timeout_member");
        assert_eq!(record.target_id, Some(42));
        assert_eq!(record.extra["duration_seconds"], Value::from(600));
        assert!(record.decision.contains("\"timeout_member\""));
        assert_eq!(record.guild_id, 1);
    }
}
