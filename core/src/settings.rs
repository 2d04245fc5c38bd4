use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::decision::Tool;

pub const CONTEXT_MESSAGES_MAX: u8 = 30;
pub const CONFIRM_TIMEOUT_MIN_SECS: u64 = 5;
pub const CONFIRM_TIMEOUT_MAX_SECS: u64 = 120;
const DEFAULT_CONTEXT_MESSAGES: u8 = 15;
const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 25;
const DEFAULT_PROACTIVE_CHANCE: f64 = 0.02;

/// Per-guild router configuration. Loaded once per request and passed by
/// reference to every component; `version` increases on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GuildSettings {
    pub version: u64,
    pub enabled: bool,
    /// Model override; `None` uses the engine default.
    pub model: Option<String>,
    /// Recent channel messages fetched for context (0–30).
    pub context_messages: u8,
    pub confirm_enabled: bool,
    pub confirm_timeout_seconds: u64,
    pub confirm_actions: BTreeSet<Tool>,
    /// Probability of an unprompted chat reply to a message without a mention.
    pub proactive_chance: f64,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            version: 0,
            enabled: true,
            model: None,
            context_messages: DEFAULT_CONTEXT_MESSAGES,
            confirm_enabled: false,
            confirm_timeout_seconds: DEFAULT_CONFIRM_TIMEOUT_SECS,
            confirm_actions: BTreeSet::from([Tool::Ban, Tool::Kick, Tool::Purge]),
            proactive_chance: DEFAULT_PROACTIVE_CHANCE,
        }
    }
}

impl GuildSettings {
    pub fn requires_confirmation(&self, tool: Tool) -> bool {
        self.confirm_enabled && self.confirm_actions.contains(&tool)
    }

    /// Confirmation window, clamped even if a stored value is out of range.
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(
            self.confirm_timeout_seconds
                .clamp(CONFIRM_TIMEOUT_MIN_SECS, CONFIRM_TIMEOUT_MAX_SECS),
        )
    }

    pub fn context_window(&self) -> usize {
        usize::from(self.context_messages.min(CONTEXT_MESSAGES_MAX))
    }

    /// Validate and apply an operator update, returning the next version.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<GuildSettings, SettingsError> {
        let mut next = self.clone();

        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(model) = &update.model {
            let model = model.trim();
            next.model = (!model.is_empty()).then(|| model.to_string());
        }
        if let Some(context) = update.context_messages {
            if context > CONTEXT_MESSAGES_MAX {
                return Err(SettingsError::ContextMessagesOutOfRange(context));
            }
            next.context_messages = context;
        }
        if let Some(confirm_enabled) = update.confirm_enabled {
            next.confirm_enabled = confirm_enabled;
        }
        if let Some(timeout) = update.confirm_timeout_seconds {
            if !(CONFIRM_TIMEOUT_MIN_SECS..=CONFIRM_TIMEOUT_MAX_SECS).contains(&timeout) {
                return Err(SettingsError::ConfirmTimeoutOutOfRange(timeout));
            }
            next.confirm_timeout_seconds = timeout;
        }
        if let Some(actions) = &update.confirm_actions {
            next.confirm_actions = actions
                .iter()
                .map(|raw| Tool::parse(raw).ok_or_else(|| SettingsError::UnknownTool(raw.clone())))
                .collect::<Result<_, _>>()?;
        }
        if let Some(chance) = update.proactive_chance {
            if !(0.0..=1.0).contains(&chance) || chance.is_nan() {
                return Err(SettingsError::ProactiveChanceOutOfRange(chance));
            }
            next.proactive_chance = chance;
        }

        next.version = self.version + 1;
        Ok(next)
    }
}

/// Partial update from the operator surface. Absent fields are unchanged;
/// an empty `model` string clears the override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_messages: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proactive_chance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("context_messages must be between 0 and {max}, got {0}", max = CONTEXT_MESSAGES_MAX)]
    ContextMessagesOutOfRange(u8),
    #[error(
        "confirm_timeout_seconds must be between {min} and {max}, got {0}",
        min = CONFIRM_TIMEOUT_MIN_SECS,
        max = CONFIRM_TIMEOUT_MAX_SECS
    )]
    ConfirmTimeoutOutOfRange(u64),
    #[error("proactive_chance must be between 0.0 and 1.0, got {0}")]
    ProactiveChanceOutOfRange(f64),
    #[error("unknown tool '{0}' in confirm_actions")]
    UnknownTool(String),
}

impl SettingsError {
    pub fn field(&self) -> &'static str {
        match self {
            SettingsError::ContextMessagesOutOfRange(_) => "context_messages",
            SettingsError::ConfirmTimeoutOutOfRange(_) => "confirm_timeout_seconds",
            SettingsError::ProactiveChanceOutOfRange(_) => "proactive_chance",
            SettingsError::UnknownTool(_) => "confirm_actions",
        }
    }
}
