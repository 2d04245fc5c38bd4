use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use modgate_core::actor::InboundRequest;
use modgate_core::decision::{Arguments, Decision, DecisionKind, Tool};

use crate::config::ModelConfig;
use crate::model::{ChatMessage, CompletionRequest, ModelClient, ModelError};
use crate::prompt::{
    CONVERSATION_SYSTEM_PROMPT, ROUTING_SYSTEM_PROMPT, build_chat_prompt, build_routing_prompt,
};

pub const NOT_CONFIGURED_REASON: &str = "AI moderation is not configured";
const DEFAULT_REASON: &str = "No reason provided";

static FENCE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[a-zA-Z0-9]*\s*").expect("valid fence start regex"));
static FENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid fence end regex"));
static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(\{.*\})").expect("valid object regex"));

/// Classifies requests through the external model.
///
/// Neither entry point returns an error: transport failures, timeouts and
/// malformed output all become an `Error` decision (or `None` for chat).
pub struct IntentRouter {
    client: Arc<dyn ModelClient>,
    config: ModelConfig,
}

impl IntentRouter {
    pub fn new(client: Arc<dyn ModelClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    pub fn is_available(&self) -> bool {
        self.client.is_available()
    }

    /// Ask the model which action the request maps to.
    pub async fn classify(
        &self,
        request: &InboundRequest,
        model_override: Option<&str>,
        history_window: usize,
    ) -> Decision {
        if !self.is_available() {
            return Decision::error(NOT_CONFIGURED_REASON);
        }

        let completion = CompletionRequest {
            model: self.model_name(model_override),
            messages: vec![
                ChatMessage::system(ROUTING_SYSTEM_PROMPT),
                ChatMessage::user(build_routing_prompt(request, history_window)),
            ],
            temperature: self.config.temperature_routing,
            max_tokens: self.config.max_tokens_routing,
        };

        match self.call(completion).await {
            Ok(raw) => parse_decision(&raw),
            Err(ModelError::EmptyResponse) => Decision::error("No response from AI model"),
            Err(err) => {
                tracing::warn!(error = %err, actor_id = request.actor.id, "routing call failed");
                Decision::error(format!("AI error: {}", error_label(&err)))
            }
        }
    }

    /// Produce a conversational reply. `None` when the model gave nothing
    /// usable.
    pub async fn converse(
        &self,
        request: &InboundRequest,
        memory: &str,
        model_override: Option<&str>,
        history_window: usize,
    ) -> Option<String> {
        if !self.is_available() {
            return Some(NOT_CONFIGURED_REASON.to_string());
        }

        let completion = CompletionRequest {
            model: self.model_name(model_override),
            messages: vec![
                ChatMessage::system(CONVERSATION_SYSTEM_PROMPT),
                ChatMessage::user(build_chat_prompt(request, memory, history_window)),
            ],
            temperature: self.config.temperature_chat,
            max_tokens: self.config.max_tokens_chat,
        };

        match self.call(completion).await {
            Ok(raw) if raw.starts_with('{') => Some(extract_json(&raw)),
            Ok(raw) => Some(raw),
            Err(err) => {
                tracing::warn!(error = %err, actor_id = request.actor.id, "conversation call failed");
                None
            }
        }
    }

    async fn call(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(timeout)),
        }
    }

    fn model_name(&self, model_override: Option<&str>) -> String {
        model_override
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(&self.config.default_model)
            .to_string()
    }
}

fn error_label(err: &ModelError) -> &'static str {
    match err {
        ModelError::NotConfigured => "NotConfigured",
        ModelError::Transport(_) => "Transport",
        ModelError::Status { .. } => "Status",
        ModelError::Timeout(_) => "Timeout",
        ModelError::EmptyResponse => "EmptyResponse",
    }
}

/// Strip code fences and cut out the outermost `{...}` span.
pub fn extract_json(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    if text.starts_with("```") {
        text = FENCE_START.replace(&text, "").into_owned();
    }
    let text = FENCE_END.replace(&text, "").trim().to_string();

    match JSON_OBJECT.captures(&text).and_then(|caps| caps.get(1)) {
        Some(object) => object.as_str().to_string(),
        None => text,
    }
}

/// Turn raw model output into a Decision.
///
/// Missing fields take defaults; any tool outside the closed set forces an
/// `Error` so an unknown tool never travels further.
pub fn parse_decision(raw: &str) -> Decision {
    let json = extract_json(raw);
    let value: Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(_) => return Decision::error("AI returned invalid JSON"),
    };
    let Value::Object(object) = value else {
        return Decision::error("AI returned non-object response");
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(DecisionKind::parse)
        .unwrap_or(DecisionKind::Error);

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    let arguments = match object.get("arguments") {
        Some(Value::Object(arguments)) => arguments.clone(),
        _ => Arguments::new(),
    };

    let tool = match object.get("tool") {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) if name.is_empty() => None,
        Some(Value::String(name)) => match Tool::parse(name) {
            Some(tool) => Some(tool),
            None => return Decision::error(format!("AI selected unknown tool `{name}`")),
        },
        Some(other) => return Decision::error(format!("AI selected unknown tool `{other}`")),
    };

    match (kind, tool) {
        (DecisionKind::ToolCall, Some(tool)) => Decision::tool_call(tool, arguments, reason),
        (DecisionKind::ToolCall, None) => Decision::error("AI requested a tool call without a tool"),
        (DecisionKind::Chat, _) => Decision {
            arguments,
            ..Decision::chat(reason)
        },
        (DecisionKind::Error, _) => Decision {
            arguments,
            ..Decision::error(reason)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_tool_call_is_parsed() {
        let decision = parse_decision(
            r#"{"type":"tool_call","reason":"spam","tool":"kick_member","arguments":{"target_user_id":42,"reason":"spam"}}"#,
        );
        assert_eq!(decision.kind, DecisionKind::ToolCall);
        assert_eq!(decision.tool, Some(Tool::Kick));
        assert_eq!(decision.target_user_id(), Some(42));
        assert_eq!(decision.reason, "spam");
    }

    #[test]
    fn fenced_chat_is_unwrapped() {
        let raw = "```json\n{\"type\":\"chat\",\"reason\":\"greeting\",\"tool\":null,\"arguments\":{}}\n```";
        let decision = parse_decision(raw);
        assert_eq!(decision.kind, DecisionKind::Chat);
        assert_eq!(decision.tool, None);
        assert_eq!(decision.reason, "greeting");
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let decision = parse_decision(
            "Sure! Here you go: {\"type\":\"tool_call\",\"tool\":\"show_help\"} hope that helps",
        );
        assert_eq!(decision.selected_tool(), Some(Tool::ShowHelp));
        assert_eq!(decision.reason, DEFAULT_REASON);
    }

    #[test]
    fn malformed_output_never_escapes_as_anything_but_error() {
        let samples = [
            "",
            "not json at all",
            "{",
            "{\"type\": \"tool_call\", ",
            "```json\n{broken}\n```",
            "[1, 2, 3]",
            "\"just a string\"",
            "null",
            "42",
            "{\"type\": }",
            "}{",
        ];
        for raw in samples {
            let decision = parse_decision(raw);
            assert_eq!(decision.kind, DecisionKind::Error, "input: {raw:?}");
            assert_eq!(decision.tool, None, "input: {raw:?}");
        }
    }

    #[test]
    fn unknown_tool_forces_error_even_for_chat() {
        for kind in ["tool_call", "chat", "error"] {
            let raw = json!({"type": kind, "tool": "nuke_server", "arguments": {}}).to_string();
            let decision = parse_decision(&raw);
            assert_eq!(decision.kind, DecisionKind::Error);
            assert_eq!(decision.tool, None);
            assert!(decision.reason.contains("nuke_server"));
        }
    }

    #[test]
    fn non_string_tool_is_rejected() {
        let decision = parse_decision(r#"{"type":"tool_call","tool":7}"#);
        assert_eq!(decision.kind, DecisionKind::Error);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let decision = parse_decision("{}");
        assert_eq!(decision.kind, DecisionKind::Error);
        assert_eq!(decision.reason, DEFAULT_REASON);
        assert!(decision.arguments.is_empty());
    }

    #[test]
    fn unknown_kind_reads_as_error() {
        let decision = parse_decision(r#"{"type":"shout","reason":"?"}"#);
        assert_eq!(decision.kind, DecisionKind::Error);
    }

    #[test]
    fn tool_call_without_tool_is_an_error() {
        let decision = parse_decision(r#"{"type":"tool_call","tool":null}"#);
        assert_eq!(decision.kind, DecisionKind::Error);
    }

    #[test]
    fn tool_is_dropped_from_non_tool_decisions() {
        let decision = parse_decision(r#"{"type":"chat","tool":"ban_member"}"#);
        assert_eq!(decision.kind, DecisionKind::Chat);
        assert_eq!(decision.tool, None);
    }

    #[test]
    fn non_object_arguments_become_empty() {
        let decision = parse_decision(r#"{"type":"tool_call","tool":"purge_messages","arguments":[5]}"#);
        assert_eq!(decision.selected_tool(), Some(Tool::Purge));
        assert!(decision.arguments.is_empty());
    }

    #[test]
    fn extract_json_strips_bare_fences() {
        assert_eq!(extract_json("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("  plain text  "), "plain text");
    }
}
