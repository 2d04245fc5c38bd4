use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use modgate_core::actor::{Actor, InboundRequest, Member, PermissionFlags};
use modgate_core::audit::AuditRecord;
use modgate_core::decision::{Decision, DecisionKind, Tool};
use modgate_core::settings::GuildSettings;

use crate::audit::{AuditLog, AuditSink};
use crate::config::EngineConfig;
use crate::confirmation::{
    ConfirmationCoordinator, ConfirmationDraft, ConfirmationEvent, ConfirmationRejection,
    ConfirmationRequest, ConfirmationState, ConfirmationSummary,
};
use crate::dispatch::{ActionDispatcher, DispatchContext, HELP_TEXT};
use crate::error::ModerationError;
use crate::gate::{PermissionGate, Verdict};
use crate::memory::{ConversationMemory, MemoryStore};
use crate::model::ModelClient;
use crate::provider::ModerationProvider;
use crate::rate_limit::RateLimiter;
use crate::router::IntentRouter;

pub const CHAT_FALLBACK: &str = "Hmm, my brain lagged. Try again?";

/// What happened to one inbound request. The host renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Not addressed to the bot, or the bot is disabled here.
    Ignored,
    Help {
        text: String,
    },
    Reply {
        text: String,
    },
    RateLimited {
        retry_after_secs: u64,
        message: String,
    },
    Failed {
        code: String,
        message: String,
    },
    AwaitingConfirmation {
        confirmation: ConfirmationRequest,
    },
    Completed {
        tool: Tool,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audit: Option<AuditRecord>,
    },
    Cancelled {
        message: String,
    },
}

impl Outcome {
    fn failed(err: &ModerationError) -> Self {
        Outcome::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    fn rate_limited(retry_after_secs: u64) -> Self {
        let err = ModerationError::RateLimited { retry_after_secs };
        Outcome::RateLimited {
            retry_after_secs,
            message: err.to_string(),
        }
    }
}

/// Dry run of routing and authorization without any side effect.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Member>,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_because: Option<String>,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub settings: GuildSettings,
    pub model_configured: bool,
    pub effective_model: String,
    pub pending_confirmations: usize,
}

/// The routing pipeline: rate limit, route, authorize, confirm, dispatch,
/// audit.
pub struct Engine {
    config: EngineConfig,
    router: IntentRouter,
    gate: PermissionGate,
    limiter: RateLimiter,
    memory: Arc<ConversationMemory>,
    confirmations: ConfirmationCoordinator,
    dispatcher: ActionDispatcher,
    audit: AuditSink,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn ModelClient>,
        provider: Arc<dyn ModerationProvider>,
        memory_store: Arc<dyn MemoryStore>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Self {
        let gate = PermissionGate::new(config.root_ids.clone());
        Self {
            router: IntentRouter::new(model, config.model.clone()),
            limiter: RateLimiter::new(config.rate_limit_calls, config.rate_limit_window),
            memory: Arc::new(ConversationMemory::new(memory_store, config.memory_max_chars)),
            confirmations: ConfirmationCoordinator::new(config.root_ids.clone()),
            dispatcher: ActionDispatcher::new(provider, gate.clone(), config.provider_timeout),
            audit: AuditSink::new(audit_log),
            gate,
            config,
        }
    }

    /// Route one inbound message end to end.
    pub async fn handle(&self, request: &InboundRequest, settings: &GuildSettings) -> Outcome {
        if !settings.enabled {
            return Outcome::Ignored;
        }

        let mentioned = request.mentions_bot();
        if !mentioned && !proactive_roll(settings.proactive_chance) {
            return Outcome::Ignored;
        }

        let content = request.cleaned_content();
        if content.is_empty() {
            return if mentioned {
                Outcome::Help {
                    text: HELP_TEXT.to_string(),
                }
            } else {
                Outcome::Ignored
            };
        }

        let request = self.effective_request(request);

        // Unprompted messages only ever get a conversational reply.
        if !mentioned {
            return self.reply(&request, settings).await;
        }

        let decision = match self.route(&request, settings).await {
            Ok(decision) => decision,
            Err(retry_after_secs) => return Outcome::rate_limited(retry_after_secs),
        };

        match (decision.kind, decision.selected_tool()) {
            (DecisionKind::ToolCall, Some(Tool::ShowHelp)) => Outcome::Help {
                text: HELP_TEXT.to_string(),
            },
            (DecisionKind::ToolCall, Some(tool)) => {
                self.run_tool(&request, settings, tool, decision).await
            }
            (DecisionKind::Chat, _) => self.reply(&request, settings).await,
            _ => {
                tracing::debug!(actor_id = request.actor.id, reason = %decision.reason, "request not routable");
                Outcome::failed(&ModerationError::Routing(decision.reason))
            }
        }
    }

    /// Classify and authorize without dispatching.
    pub async fn preview(&self, request: &InboundRequest, settings: &GuildSettings) -> Result<Preview, ModerationError> {
        let request = self.effective_request(request);
        let decision = self
            .route(&request, settings)
            .await
            .map_err(|retry_after_secs| ModerationError::RateLimited { retry_after_secs })?;

        let Some(tool) = decision.selected_tool() else {
            return Ok(Preview {
                decision,
                target: None,
                allowed: false,
                denied_because: None,
                requires_confirmation: false,
            });
        };

        let target = self
            .dispatcher
            .resolve_target(tool, &decision.arguments, request.origin.guild_id)
            .await?;
        let verdict = self.gate.authorize(&request.actor, target.as_ref(), tool);
        Ok(Preview {
            requires_confirmation: settings.requires_confirmation(tool),
            allowed: verdict.is_allowed(),
            denied_because: match verdict {
                Verdict::Allow => None,
                Verdict::Deny(reason) => Some(reason.to_string()),
            },
            target,
            decision,
        })
    }

    /// Confirm a pending request and run it with the confirming actor's
    /// current permissions.
    pub async fn confirm(&self, id: Uuid, actor: &Actor) -> Result<Outcome, ConfirmationRejection> {
        let request = self.confirmations.confirm(id, actor.id)?;
        let ctx = DispatchContext {
            actor: self.effective_actor(actor),
            origin: request.origin,
            request_content: request.request_content.clone(),
            requested_by: Some(request.actor.id),
        };
        Ok(self
            .dispatch(request.tool, &request.decision, &ctx)
            .await)
    }

    pub fn cancel(&self, id: Uuid, actor_id: u64) -> Result<Outcome, ConfirmationRejection> {
        self.confirmations.cancel(id, actor_id)?;
        Ok(Outcome::Cancelled {
            message: "The moderation action was cancelled.".to_string(),
        })
    }

    pub fn confirmation(&self, id: Uuid) -> Option<ConfirmationRequest> {
        self.confirmations
            .get(id)
            .map(|pending| pending.request().as_ref().clone())
    }

    /// Terminal confirmation transitions, including timer expiries.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent> {
        self.confirmations.subscribe()
    }

    /// Expired requests still retained. Lets a lagging subscriber catch up.
    pub fn expired_confirmations(&self) -> Vec<Arc<ConfirmationRequest>> {
        self.confirmations.resolved(ConfirmationState::Expired)
    }

    pub fn pending_confirmations(&self) -> usize {
        self.confirmations.pending_count()
    }

    pub fn model_configured(&self) -> bool {
        self.router.is_available()
    }

    pub fn status(&self, settings: &GuildSettings) -> EngineStatus {
        EngineStatus {
            settings: settings.clone(),
            model_configured: self.model_configured(),
            effective_model: settings
                .model
                .clone()
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| self.config.model.default_model.clone()),
            pending_confirmations: self.pending_confirmations(),
        }
    }

    /// Forget idle rate-limit windows.
    pub async fn cleanup(&self) {
        self.limiter.cleanup().await;
    }

    /// Rate-limit then classify. `Err` carries the retry delay.
    async fn route(&self, request: &InboundRequest, settings: &GuildSettings) -> Result<Decision, u64> {
        self.admit(request.actor.id).await?;
        let window = settings.context_window().min(self.config.routing_history_window);
        Ok(self
            .router
            .classify(request, settings.model.as_deref(), window)
            .await)
    }

    async fn admit(&self, actor_id: u64) -> Result<(), u64> {
        let status = self.limiter.try_acquire(actor_id).await;
        if status.limited {
            tracing::debug!(actor_id = actor_id, retry_after_secs = status.retry_after_secs(), "actor rate limited");
            return Err(status.retry_after_secs());
        }
        Ok(())
    }

    async fn run_tool(
        &self,
        request: &InboundRequest,
        settings: &GuildSettings,
        tool: Tool,
        decision: Decision,
    ) -> Outcome {
        let target = match self
            .dispatcher
            .resolve_target(tool, &decision.arguments, request.origin.guild_id)
            .await
        {
            Ok(target) => target,
            Err(err) => return Outcome::failed(&err),
        };

        if let Verdict::Deny(reason) = self.gate.authorize(&request.actor, target.as_ref(), tool) {
            tracing::info!(actor_id = request.actor.id, tool = tool.as_str(), reason = %reason, "moderation request denied");
            return Outcome::failed(&ModerationError::Permission(reason));
        }

        if settings.requires_confirmation(tool) {
            let summary = ConfirmationSummary::describe(tool, &decision.arguments, &decision, target.as_ref());
            let pending = self.confirmations.open(
                ConfirmationDraft {
                    tool,
                    decision,
                    actor: request.actor.clone(),
                    origin: request.origin,
                    request_content: request.content.clone(),
                    summary,
                },
                settings.confirm_timeout(),
            );
            return Outcome::AwaitingConfirmation {
                confirmation: pending.request().as_ref().clone(),
            };
        }

        let ctx = DispatchContext {
            actor: request.actor.clone(),
            origin: request.origin,
            request_content: request.content.clone(),
            requested_by: None,
        };
        self.dispatch(tool, &decision, &ctx).await
    }

    async fn dispatch(&self, tool: Tool, decision: &Decision, ctx: &DispatchContext) -> Outcome {
        match self
            .dispatcher
            .dispatch(tool, &decision.arguments, decision, ctx)
            .await
        {
            Ok(dispatched) => {
                if let Some(record) = dispatched.audit.clone() {
                    self.audit.record(record);
                }
                Outcome::Completed {
                    tool: dispatched.tool,
                    message: dispatched.message,
                    audit: dispatched.audit,
                }
            }
            Err(err) => Outcome::failed(&err),
        }
    }

    /// Conversational reply. Counts as its own model call.
    async fn reply(&self, request: &InboundRequest, settings: &GuildSettings) -> Outcome {
        if let Err(retry_after_secs) = self.admit(request.actor.id).await {
            return Outcome::rate_limited(retry_after_secs);
        }

        let actor_id = request.actor.id;
        let memory = self.memory.get(actor_id).await;
        let window = settings.context_window().min(self.config.chat_history_window);
        let reply = self
            .router
            .converse(request, &memory, settings.model.as_deref(), window)
            .await
            .filter(|reply| !reply.trim().is_empty());

        let Some(text) = reply else {
            return Outcome::Reply {
                text: CHAT_FALLBACK.to_string(),
            };
        };

        if self.router.is_available() {
            let store = self.memory.clone();
            let user_message = request.cleaned_content();
            let bot_reply = text.clone();
            tokio::spawn(async move {
                store.append(actor_id, &user_message, &bot_reply).await;
            });
        }
        Outcome::Reply { text }
    }

    fn effective_request(&self, request: &InboundRequest) -> InboundRequest {
        InboundRequest {
            actor: self.effective_actor(&request.actor),
            ..request.clone()
        }
    }

    /// Root identities act with every capability.
    fn effective_actor(&self, actor: &Actor) -> Actor {
        if self.gate.is_root(actor.id) {
            Actor {
                permissions: PermissionFlags::all(),
                ..actor.clone()
            }
        } else {
            actor.clone()
        }
    }
}

fn proactive_roll(chance: f64) -> bool {
    chance > 0.0 && rand::random::<f64>() <= chance
}
