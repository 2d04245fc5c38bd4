use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use modgate_core::actor::{Actor, Member, Origin};
use modgate_core::decision::{Arguments, Decision, Tool, argument_u64};

use crate::dispatch::{action_reason, ban_delete_days, purge_amount, timeout_seconds};

pub const NOT_FOR_YOU: &str = "This confirmation is not for you.";

/// How long resolved requests stay addressable so late clicks get a
/// "no longer actionable" answer instead of "not found".
const RESOLVED_RETENTION: Duration = Duration::from_secs(300);
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationState::Pending => "pending",
            ConfirmationState::Confirmed => "confirmed",
            ConfirmationState::Cancelled => "cancelled",
            ConfirmationState::Expired => "expired",
        }
    }
}

/// What the confirmation prompt shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationSummary {
    pub action: String,
    pub target: Option<String>,
    pub reason: String,
    pub details: BTreeMap<String, String>,
}

impl ConfirmationSummary {
    pub fn describe(tool: Tool, arguments: &Arguments, decision: &Decision, target: Option<&Member>) -> Self {
        let target = match (target, argument_u64(arguments, "target_user_id")) {
            (Some(member), _) => Some(format!("{} ({})", member.display_name, member.id)),
            (None, Some(user_id)) => Some(format!("user {user_id}")),
            (None, None) => None,
        };

        let reason = match arguments.get("reason").and_then(|value| value.as_str()) {
            Some(reason) if !reason.trim().is_empty() => reason.trim().to_string(),
            _ if !decision.reason.trim().is_empty() => decision.reason.clone(),
            _ => action_reason(tool, arguments),
        };

        let mut details = BTreeMap::new();
        match tool {
            Tool::Timeout => {
                details.insert(
                    "duration".to_string(),
                    format!("{} minute(s)", timeout_seconds(arguments) / 60),
                );
            }
            Tool::Purge => {
                details.insert("amount".to_string(), format!("{} message(s)", purge_amount(arguments)));
            }
            Tool::Ban => {
                details.insert(
                    "delete_messages".to_string(),
                    format!("{} day(s)", ban_delete_days(arguments)),
                );
            }
            Tool::Warn | Tool::RemoveTimeout | Tool::Kick | Tool::Unban | Tool::ShowHelp => {}
        }

        Self {
            action: tool.display_name().to_string(),
            target,
            reason,
            details,
        }
    }
}

/// An approval request for one validated decision.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub tool: Tool,
    #[serde(skip)]
    pub arguments: Arguments,
    pub decision: Decision,
    /// Snapshot of the requesting actor at request time.
    pub actor: Actor,
    pub origin: Origin,
    #[serde(skip)]
    pub request_content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub summary: ConfirmationSummary,
}

/// Everything needed to open a confirmation.
#[derive(Debug, Clone)]
pub struct ConfirmationDraft {
    pub tool: Tool,
    pub decision: Decision,
    pub actor: Actor,
    pub origin: Origin,
    pub request_content: String,
    pub summary: ConfirmationSummary,
}

/// Why a confirm/cancel attempt had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationRejection {
    #[error("This confirmation is not for you.")]
    NotAuthorized,
    #[error("This confirmation is no longer actionable ({state}).", state = .0.as_str())]
    NoLongerActionable(ConfirmationState),
    #[error("Confirmation not found.")]
    NotFound,
}

/// Broadcast on every terminal transition.
#[derive(Debug, Clone)]
pub struct ConfirmationEvent {
    pub state: ConfirmationState,
    pub request: Arc<ConfirmationRequest>,
}

struct Slot {
    state: ConfirmationState,
    timer: Option<AbortHandle>,
    resolved_at: Option<Instant>,
}

/// One pending request and its single-use terminal flag.
///
/// State and timer live under the same lock, so the first transition both
/// wins and disarms the timer in one step.
pub struct PendingConfirmation {
    request: Arc<ConfirmationRequest>,
    slot: Mutex<Slot>,
}

impl PendingConfirmation {
    fn new(request: ConfirmationRequest) -> Self {
        Self {
            request: Arc::new(request),
            slot: Mutex::new(Slot {
                state: ConfirmationState::Pending,
                timer: None,
                resolved_at: None,
            }),
        }
    }

    pub fn request(&self) -> &Arc<ConfirmationRequest> {
        &self.request
    }

    pub fn state(&self) -> ConfirmationState {
        self.lock().state
    }

    /// Move Pending to `next`. Only the first call succeeds.
    pub fn transition(&self, next: ConfirmationState) -> Result<(), ConfirmationRejection> {
        let mut slot = self.lock();
        if slot.state.is_terminal() {
            return Err(ConfirmationRejection::NoLongerActionable(slot.state));
        }
        slot.state = next;
        slot.resolved_at = Some(Instant::now());
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        Ok(())
    }

    fn arm(&self, timer: AbortHandle) {
        let mut slot = self.lock();
        if slot.state.is_terminal() {
            timer.abort();
        } else {
            slot.timer = Some(timer);
        }
    }

    fn resolved_before(&self, cutoff: Instant) -> bool {
        self.lock().resolved_at.is_some_and(|at| at <= cutoff)
    }

    // Writers never panic mid-update, so a poisoned slot is still consistent.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Registry {
    pending: Mutex<HashMap<Uuid, Arc<PendingConfirmation>>>,
    events: broadcast::Sender<ConfirmationEvent>,
}

impl Registry {
    fn get(&self, id: Uuid) -> Option<Arc<PendingConfirmation>> {
        self.map().get(&id).cloned()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<PendingConfirmation>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, pending: &PendingConfirmation, next: ConfirmationState) -> Result<(), ConfirmationRejection> {
        pending.transition(next)?;
        tracing::info!(
            confirmation_id = %pending.request.id,
            tool = pending.request.tool.as_str(),
            state = next.as_str(),
            "confirmation resolved"
        );
        // No receivers is fine.
        let _ = self.events.send(ConfirmationEvent {
            state: next,
            request: pending.request.clone(),
        });
        Ok(())
    }

    fn expire(&self, id: Uuid) {
        if let Some(pending) = self.get(id) {
            let _ = self.resolve(&pending, ConfirmationState::Expired);
        }
    }
}

/// Owns every in-flight confirmation and its expiry timer.
pub struct ConfirmationCoordinator {
    registry: Arc<Registry>,
    root_ids: BTreeSet<u64>,
}

impl ConfirmationCoordinator {
    pub fn new(root_ids: BTreeSet<u64>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: Arc::new(Registry {
                pending: Mutex::new(HashMap::new()),
                events,
            }),
            root_ids,
        }
    }

    /// Register a request and arm its expiry timer. Must run inside a tokio
    /// runtime.
    pub fn open(&self, draft: ConfirmationDraft, timeout: Duration) -> Arc<PendingConfirmation> {
        self.prune_resolved();

        let ConfirmationDraft {
            tool,
            decision,
            actor,
            origin,
            request_content,
            summary,
        } = draft;

        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(120));
        let request = ConfirmationRequest {
            id: Uuid::now_v7(),
            tool,
            arguments: decision.arguments.clone(),
            decision,
            actor,
            origin,
            request_content,
            created_at,
            expires_at,
            summary,
        };
        let id = request.id;
        let pending = Arc::new(PendingConfirmation::new(request));
        self.registry.map().insert(id, pending.clone());

        let registry = Arc::downgrade(&self.registry);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(registry) = registry.upgrade() {
                registry.expire(id);
            }
        });
        pending.arm(timer.abort_handle());

        tracing::debug!(confirmation_id = %id, tool = tool.as_str(), timeout_secs = timeout.as_secs(), "confirmation opened");
        pending
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<PendingConfirmation>> {
        self.registry.get(id)
    }

    /// Accept the request. On success the caller owns the single dispatch.
    pub fn confirm(&self, id: Uuid, actor_id: u64) -> Result<Arc<ConfirmationRequest>, ConfirmationRejection> {
        let pending = self.authorized(id, actor_id)?;
        self.registry.resolve(&pending, ConfirmationState::Confirmed)?;
        Ok(pending.request.clone())
    }

    pub fn cancel(&self, id: Uuid, actor_id: u64) -> Result<Arc<ConfirmationRequest>, ConfirmationRejection> {
        let pending = self.authorized(id, actor_id)?;
        self.registry.resolve(&pending, ConfirmationState::Cancelled)?;
        Ok(pending.request.clone())
    }

    /// Force expiry now, as the timer would.
    pub fn expire(&self, id: Uuid) -> Result<(), ConfirmationRejection> {
        let pending = self.get(id).ok_or(ConfirmationRejection::NotFound)?;
        self.registry.resolve(&pending, ConfirmationState::Expired)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationEvent> {
        self.registry.events.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.registry
            .map()
            .values()
            .filter(|pending| pending.state() == ConfirmationState::Pending)
            .count()
    }

    /// Retained requests that ended in `state`, for subscribers that fell
    /// behind the event stream.
    pub fn resolved(&self, state: ConfirmationState) -> Vec<Arc<ConfirmationRequest>> {
        self.registry
            .map()
            .values()
            .filter(|pending| pending.state() == state)
            .map(|pending| pending.request.clone())
            .collect()
    }

    fn authorized(&self, id: Uuid, actor_id: u64) -> Result<Arc<PendingConfirmation>, ConfirmationRejection> {
        let pending = self.get(id).ok_or(ConfirmationRejection::NotFound)?;
        if pending.request.actor.id != actor_id && !self.root_ids.contains(&actor_id) {
            return Err(ConfirmationRejection::NotAuthorized);
        }
        Ok(pending)
    }

    fn prune_resolved(&self) {
        let Some(cutoff) = Instant::now().checked_sub(RESOLVED_RETENTION) else {
            return;
        };
        self.registry
            .map()
            .retain(|_, pending| !pending.resolved_before(cutoff));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modgate_core::actor::PermissionFlags;
    use serde_json::json;

    const ROOT: u64 = 1;
    const REQUESTER: u64 = 10;

    fn coordinator() -> ConfirmationCoordinator {
        ConfirmationCoordinator::new(BTreeSet::from([ROOT]))
    }

    fn actor() -> Actor {
        Actor {
            id: REQUESTER,
            display_name: "mod".to_string(),
            rank: 5,
            is_guild_owner: false,
            permissions: PermissionFlags::all(),
        }
    }

    fn decision() -> Decision {
        let arguments = match json!({"amount": 25, "reason": "cleanup"}) {
            serde_json::Value::Object(map) => map,
            _ => Arguments::new(),
        };
        Decision::tool_call(Tool::Purge, arguments, "purge request")
    }

    fn open(coordinator: &ConfirmationCoordinator, timeout: Duration) -> Arc<PendingConfirmation> {
        let decision = decision();
        let summary = ConfirmationSummary::describe(Tool::Purge, &decision.arguments, &decision, None);
        coordinator.open(
            ConfirmationDraft {
                tool: Tool::Purge,
                decision,
                actor: actor(),
                origin: Origin {
                    guild_id: 100,
                    channel_id: 200,
                    message_id: 300,
                },
                request_content: "purge 25".to_string(),
                summary,
            },
            timeout,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_transition_wins() {
        let coordinator = coordinator();
        let pending = open(&coordinator, Duration::from_secs(30));
        let id = pending.request().id;

        assert!(coordinator.confirm(id, REQUESTER).is_ok());
        assert_eq!(
            coordinator.confirm(id, REQUESTER).unwrap_err(),
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Confirmed)
        );
        assert_eq!(
            coordinator.cancel(id, REQUESTER).unwrap_err(),
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Confirmed)
        );
        assert_eq!(pending.state(), ConfirmationState::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_expires_pending_request() {
        let coordinator = coordinator();
        let mut events = coordinator.subscribe();
        let pending = open(&coordinator, Duration::from_secs(10));
        let id = pending.request().id;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(pending.state(), ConfirmationState::Expired);
        let rejection = coordinator.confirm(id, REQUESTER).unwrap_err();
        assert_eq!(
            rejection,
            ConfirmationRejection::NoLongerActionable(ConfirmationState::Expired)
        );
        assert_eq!(
            rejection.to_string(),
            "This confirmation is no longer actionable (expired)."
        );
        let event = events.recv().await.unwrap();
        assert_eq!(event.state, ConfirmationState::Expired);
        assert_eq!(event.request.id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_requests_can_be_swept_after_the_fact() {
        let coordinator = coordinator();
        let expiring = open(&coordinator, Duration::from_secs(5));
        let confirmed = open(&coordinator, Duration::from_secs(5));
        let waiting = open(&coordinator, Duration::from_secs(60));
        coordinator.confirm(confirmed.request().id, REQUESTER).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let expired = coordinator.resolved(ConfirmationState::Expired);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, expiring.request().id);
        assert_eq!(waiting.state(), ConfirmationState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn resolving_disarms_the_timer() {
        let coordinator = coordinator();
        let mut events = coordinator.subscribe();
        let pending = open(&coordinator, Duration::from_secs(10));
        coordinator.cancel(pending.request().id, REQUESTER).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(pending.state(), ConfirmationState::Cancelled);
        assert_eq!(events.recv().await.unwrap().state, ConfirmationState::Cancelled);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn only_requester_or_root_may_act() {
        let coordinator = coordinator();
        let pending = open(&coordinator, Duration::from_secs(30));
        let id = pending.request().id;

        assert_eq!(
            coordinator.confirm(id, 99).unwrap_err(),
            ConfirmationRejection::NotAuthorized
        );
        assert_eq!(pending.state(), ConfirmationState::Pending);
        assert_eq!(NOT_FOR_YOU, ConfirmationRejection::NotAuthorized.to_string());

        assert!(coordinator.cancel(id, ROOT).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_confirms_resolve_once() {
        let coordinator = Arc::new(coordinator());
        let pending = open(&coordinator, Duration::from_secs(30));
        let id = pending.request().id;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move { coordinator.confirm(id, REQUESTER).is_ok() }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_requests_are_pruned_after_retention() {
        let coordinator = coordinator();
        let first = open(&coordinator, Duration::from_secs(10));
        let id = first.request().id;
        coordinator.confirm(id, REQUESTER).unwrap();

        tokio::time::advance(RESOLVED_RETENTION + Duration::from_secs(1)).await;
        let _second = open(&coordinator, Duration::from_secs(10));
        assert!(coordinator.get(id).is_none());
        assert_eq!(coordinator.pending_count(), 1);
        assert_eq!(
            coordinator.confirm(id, REQUESTER).unwrap_err(),
            ConfirmationRejection::NotFound
        );
    }

    #[test]
    fn summary_reports_target_reason_and_extras() {
        let decision = decision();
        let summary = ConfirmationSummary::describe(Tool::Purge, &decision.arguments, &decision, None);
        assert_eq!(summary.reason, "cleanup");
        assert_eq!(summary.target, None);
        assert_eq!(summary.details["amount"], "25 message(s)");

        let member = Member {
            id: 42,
            display_name: "spammer".to_string(),
            rank: 1,
            is_guild_owner: false,
            is_bot: false,
        };
        let ban = Decision::tool_call(Tool::Ban, Arguments::new(), "raid");
        let summary = ConfirmationSummary::describe(Tool::Ban, &ban.arguments, &ban, Some(&member));
        assert_eq!(summary.target.as_deref(), Some("spammer (42)"));
        assert_eq!(summary.reason, "raid");
        assert_eq!(summary.details["delete_messages"], "0 day(s)");
    }
}
