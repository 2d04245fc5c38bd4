use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat-completion round-trip.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model API key is not configured")]
    NotConfigured,
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model request timed out after {0:?}")]
    Timeout(Duration),
    #[error("model returned no content")]
    EmptyResponse,
}

/// The external natural-language model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// False when requests cannot be made at all (no credentials).
    fn is_available(&self) -> bool;

    /// Raw text of the first choice.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let base = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        let endpoint = url::Url::parse(&base)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|err| ModelError::Transport(format!("invalid model base URL: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ModelError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let api_key = self.api_key.as_deref().ok_or(ModelError::NotConfigured)?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ModelError::Transport("request timed out".to_string())
                } else {
                    ModelError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, model = %request.model, "model request returned non-success status");
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed = response
            .json::<CompletionResponse>()
            .await
            .map_err(|err| ModelError::Transport(format!("unreadable model response: {err}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_under_base_path() {
        let config = ModelConfig {
            base_url: "https://api.example.com/openai/v1".to_string(),
            ..ModelConfig::default()
        };
        let client = OpenAiCompatClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint.as_str(),
            "https://api.example.com/openai/v1/chat/completions"
        );
        assert!(!client.is_available());
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = OpenAiCompatClient::new(&ModelConfig::default()).unwrap();
        let err = client
            .complete(CompletionRequest {
                model: "m".to_string(),
                messages: vec![ChatMessage::user("hi")],
                temperature: 0.2,
                max_tokens: 16,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::NotConfigured);
    }

    #[test]
    fn completion_response_tolerates_null_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
