use std::collections::BTreeSet;
use std::time::Duration;

const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_MODEL_BASE_URL: &str = "https://api.groq.com/openai/v1/";

/// Settings for the external language model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub temperature_routing: f32,
    pub temperature_chat: f32,
    pub max_tokens_routing: u32,
    pub max_tokens_chat: u32,
    /// Upper bound for one model round-trip.
    pub request_timeout: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            temperature_routing: 0.2,
            temperature_chat: 0.8,
            max_tokens_routing: 512,
            max_tokens_chat: 512,
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Process-wide engine configuration. Per-guild behavior lives in
/// `GuildSettings` and is passed per request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: ModelConfig,
    /// Identities that pass every permission check.
    pub root_ids: BTreeSet<u64>,
    pub rate_limit_calls: usize,
    pub rate_limit_window: Duration,
    pub memory_max_chars: usize,
    /// Recent messages shown to the routing prompt.
    pub routing_history_window: usize,
    /// Recent messages shown to the conversation prompt.
    pub chat_history_window: usize,
    /// Upper bound for one moderation-provider call.
    pub provider_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            root_ids: BTreeSet::new(),
            rate_limit_calls: 30,
            rate_limit_window: Duration::from_secs(60),
            memory_max_chars: 32_000,
            routing_history_window: 10,
            chat_history_window: 50,
            provider_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Read overrides from the environment. Unparseable values fall back to
    /// the defaults with a warning instead of failing startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let model = ModelConfig {
            api_key: std::env::var("GROQ_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            base_url: std::env::var("GROQ_BASE_URL").unwrap_or(defaults.model.base_url),
            default_model: std::env::var("GROQ_MODEL").unwrap_or(defaults.model.default_model),
            request_timeout: env_secs("MODGATE_MODEL_TIMEOUT_SECS")
                .unwrap_or(defaults.model.request_timeout),
            ..defaults.model
        };

        Self {
            model,
            root_ids: std::env::var("MODGATE_ROOT_IDS")
                .map(|raw| parse_id_list(&raw))
                .unwrap_or_default(),
            rate_limit_calls: env_parse("MODGATE_RATE_LIMIT_CALLS")
                .unwrap_or(defaults.rate_limit_calls),
            rate_limit_window: env_secs("MODGATE_RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.rate_limit_window),
            memory_max_chars: env_parse("MODGATE_MEMORY_MAX_CHARS")
                .unwrap_or(defaults.memory_max_chars),
            routing_history_window: defaults.routing_history_window,
            chat_history_window: defaults.chat_history_window,
            provider_timeout: env_secs("MODGATE_PROVIDER_TIMEOUT_SECS")
                .unwrap_or(defaults.provider_timeout),
        }
    }

    pub fn is_root(&self, user_id: u64) -> bool {
        self.root_ids.contains(&user_id)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key = key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

/// Parse a comma/space separated id list; invalid entries are skipped.
pub fn parse_id_list(raw: &str) -> BTreeSet<u64> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}
