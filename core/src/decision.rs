use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::actor::Capability;

/// Tool arguments as returned by the model. Never trusted as-is:
/// every handler re-validates the shapes it reads.
pub type Arguments = Map<String, Value>;

/// What the router decided to do with one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ToolCall,
    Chat,
    Error,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::ToolCall => "tool_call",
            DecisionKind::Chat => "chat",
            DecisionKind::Error => "error",
        }
    }

    /// Parse a wire name. Unknown names are `None`; callers treat that as `Error`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "tool_call" => Some(DecisionKind::ToolCall),
            "chat" => Some(DecisionKind::Chat),
            "error" => Some(DecisionKind::Error),
            _ => None,
        }
    }
}

/// The closed set of moderation tools the model may select.
///
/// Wire names are part of the model contract and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
pub enum Tool {
    #[serde(rename = "warn_member")]
    Warn,
    #[serde(rename = "timeout_member")]
    Timeout,
    #[serde(rename = "untimeout_member")]
    RemoveTimeout,
    #[serde(rename = "kick_member")]
    Kick,
    #[serde(rename = "ban_member")]
    Ban,
    #[serde(rename = "unban_member")]
    Unban,
    #[serde(rename = "purge_messages")]
    Purge,
    #[serde(rename = "show_help")]
    ShowHelp,
}

/// How a tool addresses the identity it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A current guild member, resolved through the moderation provider.
    Member,
    /// A bare user id; the user is usually not a member (unban).
    UserId,
    /// The tool acts on a channel or on nothing.
    None,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::Warn,
        Tool::Timeout,
        Tool::RemoveTimeout,
        Tool::Kick,
        Tool::Ban,
        Tool::Unban,
        Tool::Purge,
        Tool::ShowHelp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Warn => "warn_member",
            Tool::Timeout => "timeout_member",
            Tool::RemoveTimeout => "untimeout_member",
            Tool::Kick => "kick_member",
            Tool::Ban => "ban_member",
            Tool::Unban => "unban_member",
            Tool::Purge => "purge_messages",
            Tool::ShowHelp => "show_help",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Tool::ALL.into_iter().find(|tool| tool.as_str() == raw)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::Warn => "Warn Member",
            Tool::Timeout => "Timeout Member",
            Tool::RemoveTimeout => "Remove Timeout",
            Tool::Kick => "Kick Member",
            Tool::Ban => "Ban Member",
            Tool::Unban => "Unban Member",
            Tool::Purge => "Purge Messages",
            Tool::ShowHelp => "Show Help",
        }
    }

    /// Capability flag the actor must hold. `ShowHelp` needs none.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Tool::Warn | Tool::Timeout | Tool::RemoveTimeout => Some(Capability::ModerateMembers),
            Tool::Kick => Some(Capability::KickMembers),
            Tool::Ban | Tool::Unban => Some(Capability::BanMembers),
            Tool::Purge => Some(Capability::ManageMessages),
            Tool::ShowHelp => None,
        }
    }

    pub fn target_kind(&self) -> TargetKind {
        match self {
            Tool::Warn | Tool::Timeout | Tool::RemoveTimeout | Tool::Kick | Tool::Ban => {
                TargetKind::Member
            }
            Tool::Unban => TargetKind::UserId,
            Tool::Purge | Tool::ShowHelp => TargetKind::None,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for Tool {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tool::parse(s).ok_or_else(|| UnknownTool(s.trim().to_string()))
    }
}

/// The classified output of the router for one request.
///
/// Invariant: `tool` is `Some` iff `kind == ToolCall`. Construct through
/// the helpers below; the router never builds one by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    #[serde(rename = "type")]
    pub kind: DecisionKind,
    pub reason: String,
    pub tool: Option<Tool>,
    #[schema(value_type = Object)]
    pub arguments: Arguments,
}

impl Decision {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Error,
            reason: reason.into(),
            tool: None,
            arguments: Arguments::new(),
        }
    }

    pub fn chat(reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::Chat,
            reason: reason.into(),
            tool: None,
            arguments: Arguments::new(),
        }
    }

    pub fn tool_call(tool: Tool, arguments: Arguments, reason: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::ToolCall,
            reason: reason.into(),
            tool: Some(tool),
            arguments,
        }
    }

    /// The tool to run, only when this is a well-formed tool call.
    pub fn selected_tool(&self) -> Option<Tool> {
        match self.kind {
            DecisionKind::ToolCall => self.tool,
            _ => None,
        }
    }

    pub fn target_user_id(&self) -> Option<u64> {
        argument_u64(&self.arguments, "target_user_id")
    }

    /// Single-line JSON used in audit records.
    pub fn compact(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"type\":\"{}\"}}", self.kind.as_str())
        })
    }
}

/// Read an unsigned integer argument. Models emit ids both as numbers and
/// as numeric strings, so both are accepted.
pub fn argument_u64(args: &Arguments, key: &str) -> Option<u64> {
    match args.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0 && v.fract() == 0.0).map(|v| v as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a signed integer argument (numbers or numeric strings).
pub fn argument_i64(args: &Arguments, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a non-empty string argument.
pub fn argument_str<'a>(args: &'a Arguments, key: &str) -> Option<&'a str> {
    match args.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_wire_names_round_trip_through_parse() {
        for tool in Tool::ALL {
            assert_eq!(Tool::parse(tool.as_str()), Some(tool));
            let encoded = serde_json::to_value(tool).unwrap();
            assert_eq!(encoded, json!(tool.as_str()));
        }
        assert_eq!(Tool::parse("nuke_server"), None);
        assert!("banish".parse::<Tool>().is_err());
    }

    #[test]
    fn decision_serializes_with_wire_field_names() {
        let mut args = Arguments::new();
        args.insert("target_user_id".to_string(), json!(42));
        let decision = Decision::tool_call(Tool::Kick, args, "spam");
        let value: Value = serde_json::from_str(&decision.compact()).unwrap();
        assert_eq!(value["type"], json!("tool_call"));
        assert_eq!(value["tool"], json!("kick_member"));
        assert_eq!(value["arguments"]["target_user_id"], json!(42));
    }

    #[test]
    fn integer_arguments_accept_numbers_and_numeric_strings() {
        let args = json!({
            "a": 42,
            "b": "1234567890123",
            "c": "abc",
            "d": -5,
            "e": 7.0
        });
        let args = args.as_object().unwrap().clone();
        assert_eq!(argument_u64(&args, "a"), Some(42));
        assert_eq!(argument_u64(&args, "b"), Some(1_234_567_890_123));
        assert_eq!(argument_u64(&args, "c"), None);
        assert_eq!(argument_u64(&args, "d"), None);
        assert_eq!(argument_i64(&args, "d"), Some(-5));
        assert_eq!(argument_i64(&args, "e"), Some(7));
        assert_eq!(argument_u64(&args, "missing"), None);
    }

    #[test]
    fn selected_tool_requires_tool_call_kind() {
        let mut decision = Decision::chat("hi");
        decision.tool = Some(Tool::Ban);
        assert_eq!(decision.selected_tool(), None);
    }
}
