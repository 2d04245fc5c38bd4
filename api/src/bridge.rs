//! Moderation provider backed by the chat-platform bridge over HTTP.
//!
//! The bridge owns the platform connection. This side only asks it to
//! resolve members, apply actions and retire confirmation prompts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use modgate_core::actor::Member;
use modgate_engine::confirmation::ConfirmationState;
use modgate_engine::provider::{ActionContext, ModerationProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeConfigError {
    #[error("invalid bridge URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ActionCall<'a> {
    action: &'static str,
    #[serde(flatten)]
    ctx: &'a ActionContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_message_days: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<u32>,
}

impl<'a> ActionCall<'a> {
    fn new(action: &'static str, ctx: &'a ActionContext) -> Self {
        Self {
            action,
            ctx,
            target_id: None,
            duration_seconds: None,
            delete_message_days: None,
            amount: None,
        }
    }

    fn target(mut self, target_id: u64) -> Self {
        self.target_id = Some(target_id);
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct ActionResult {
    #[serde(default)]
    deleted_count: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RetirePrompt<'a> {
    state: ConfirmationState,
    message: &'a str,
}

pub struct HttpBridge {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    timeout: Duration,
}

impl HttpBridge {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, BridgeConfigError> {
        let base = normalize_base(base_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            timeout,
        })
    }

    /// Tell the bridge to disable the buttons of a resolved confirmation.
    pub async fn retire_prompt(&self, id: Uuid, state: ConfirmationState, message: &str) -> Result<(), ProviderError> {
        let url = self.endpoint(&format!("confirmations/{id}/retire"))?;
        let response = self
            .authorized(self.http.post(url))
            .json(&RetirePrompt { state, message })
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        check_status(response).await.map(|_| ())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base
            .join(path)
            .map_err(|err| ProviderError::transient(format!("bad bridge path: {err}")))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::timeout(self.timeout)
        } else {
            ProviderError::transient(err.to_string())
        }
    }

    async fn act(&self, call: ActionCall<'_>) -> Result<ActionResult, ProviderError> {
        let url = self.endpoint("actions")?;
        tracing::debug!(action = call.action, guild_id = call.ctx.guild_id, target_id = ?call.target_id, "bridge action");
        let response = self
            .authorized(self.http.post(url))
            .json(&call)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let response = check_status(response).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        parse_action_result(&body)
    }
}

/// An empty success body is fine; a non-empty one must decode.
fn parse_action_result(body: &[u8]) -> Result<ActionResult, ProviderError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ActionResult::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ProviderError::transient(format!("invalid action result: {err}")))
}

fn normalize_base(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{trimmed}/"))
    }
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ProviderError::forbidden(body),
        StatusCode::NOT_FOUND => ProviderError::not_found(body),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            ProviderError::transient(format!("bridge timed out: {body}"))
        }
        _ => ProviderError::transient(format!("bridge returned {status}: {body}")),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body))
}

#[async_trait]
impl ModerationProvider for HttpBridge {
    async fn resolve_member(&self, guild_id: u64, user_id: u64) -> Result<Option<Member>, ProviderError> {
        let url = self.endpoint(&format!("guilds/{guild_id}/members/{user_id}"))?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        response
            .json::<Member>()
            .await
            .map(Some)
            .map_err(|err| ProviderError::transient(format!("invalid member payload: {err}")))
    }

    async fn warn(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError> {
        self.act(ActionCall::new("warn", ctx).target(target.id)).await?;
        Ok(())
    }

    async fn timeout(&self, ctx: &ActionContext, target: &Member, duration: Duration) -> Result<(), ProviderError> {
        let mut call = ActionCall::new("timeout", ctx).target(target.id);
        call.duration_seconds = Some(duration.as_secs());
        self.act(call).await?;
        Ok(())
    }

    async fn remove_timeout(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError> {
        self.act(ActionCall::new("remove_timeout", ctx).target(target.id)).await?;
        Ok(())
    }

    async fn kick(&self, ctx: &ActionContext, target: &Member) -> Result<(), ProviderError> {
        self.act(ActionCall::new("kick", ctx).target(target.id)).await?;
        Ok(())
    }

    async fn ban(&self, ctx: &ActionContext, target: &Member, delete_message_days: u8) -> Result<(), ProviderError> {
        let mut call = ActionCall::new("ban", ctx).target(target.id);
        call.delete_message_days = Some(delete_message_days);
        self.act(call).await?;
        Ok(())
    }

    async fn unban(&self, ctx: &ActionContext, user_id: u64) -> Result<(), ProviderError> {
        self.act(ActionCall::new("unban", ctx).target(user_id)).await?;
        Ok(())
    }

    async fn purge(&self, ctx: &ActionContext, amount: u32) -> Result<u32, ProviderError> {
        let mut call = ActionCall::new("purge", ctx);
        call.amount = Some(amount);
        self.act(call)
            .await?
            .deleted_count
            .ok_or_else(|| ProviderError::transient("bridge did not report deleted_count"))
    }
}
