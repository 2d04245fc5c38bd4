use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;

/// Longest slice of either side of an exchange kept in memory.
const EXCHANGE_SIDE_MAX_CHARS: usize = 200;

/// External persistence for per-actor conversation memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load(&self, actor_id: u64) -> Result<Option<String>, StoreError>;
    async fn store(&self, actor_id: u64, memory: &str) -> Result<(), StoreError>;
}

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    entries: RwLock<HashMap<u64, String>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn load(&self, actor_id: u64) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(&actor_id).cloned())
    }

    async fn store(&self, actor_id: u64, memory: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(actor_id, memory.to_string());
        Ok(())
    }
}

/// Rolling per-actor text buffer that gives the model continuity.
///
/// FIFO character window: when the cap is exceeded the oldest text is cut
/// off wholesale. Nothing is summarized.
pub struct ConversationMemory {
    store: Arc<dyn MemoryStore>,
    max_chars: usize,
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl ConversationMemory {
    pub fn new(store: Arc<dyn MemoryStore>, max_chars: usize) -> Self {
        Self {
            store,
            max_chars,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Current memory for the actor; store failures read as empty.
    pub async fn get(&self, actor_id: u64) -> String {
        match self.store.load(actor_id).await {
            Ok(memory) => memory.unwrap_or_default(),
            Err(err) => {
                tracing::debug!(error = %err, actor_id = actor_id, "could not load conversation memory");
                String::new()
            }
        }
    }

    /// Append one exchange. Serialized per actor so concurrent replies to the
    /// same actor do not overwrite each other.
    pub async fn append(&self, actor_id: u64, user_message: &str, bot_reply: &str) {
        let key_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(actor_id).or_default().clone()
        };
        {
            let _guard = key_lock.lock().await;
            let past = self.get(actor_id).await;
            let next = append_exchange(&past, user_message, bot_reply, self.max_chars);
            if let Err(err) = self.store.store(actor_id, &next).await {
                tracing::debug!(error = %err, actor_id = actor_id, "failed to update conversation memory");
            }
        }

        // Clones are only taken under `locks`, so with it held a count of two
        // (map + ours) means no other append is waiting on this actor.
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(&actor_id);
        }
    }
}

/// Render `past + exchange` and cut it to `max_chars` from the front.
pub fn append_exchange(past: &str, user_message: &str, bot_reply: &str, max_chars: usize) -> String {
    let entry = format!(
        "\n[user]: {}\n[bot]: {}",
        take_chars(user_message, EXCHANGE_SIDE_MAX_CHARS),
        take_chars(bot_reply, EXCHANGE_SIDE_MAX_CHARS)
    );
    let combined = format!("{past}{entry}");
    truncate_front(combined.trim(), max_chars)
}

/// Keep the last `max_chars` characters.
pub fn truncate_front(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}

fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl MemoryStore for FailingStore {
        async fn load(&self, _actor_id: u64) -> Result<Option<String>, StoreError> {
            Err(StoreError::new("down"))
        }

        async fn store(&self, _actor_id: u64, _memory: &str) -> Result<(), StoreError> {
            Err(StoreError::new("down"))
        }
    }

    #[test]
    fn exchange_is_rendered_and_trimmed() {
        let memory = append_exchange("", "hello", "hi there", 1000);
        assert_eq!(memory, "[user]: hello\n[bot]: hi there");
    }

    #[test]
    fn each_side_is_capped_at_two_hundred_chars() {
        let long = "a".repeat(500);
        let memory = append_exchange("", &long, "ok", 10_000);
        assert!(memory.contains(&format!("[user]: {}\n", "a".repeat(200))));
        assert!(!memory.contains(&"a".repeat(201)));
    }

    #[test]
    fn oldest_text_is_dropped_when_over_budget() {
        let past = "0123456789";
        let memory = append_exchange(past, "u", "b", 20);
        assert_eq!(memory.chars().count(), 20);
        assert!(memory.ends_with("[bot]: b"));
        assert!(!memory.starts_with('0'));
    }

    #[test]
    fn truncate_front_counts_characters_not_bytes() {
        assert_eq!(truncate_front("héllo wörld", 5), "wörld");
        assert_eq!(truncate_front("short", 10), "short");
    }

    #[tokio::test]
    async fn append_then_get_round_trips_through_store() {
        let memory = ConversationMemory::new(Arc::new(InMemoryMemoryStore::new()), 1000);
        memory.append(7, "first", "one").await;
        memory.append(7, "second", "two").await;
        let text = memory.get(7).await;
        assert_eq!(text, "[user]: first\n[bot]: one\n[user]: second\n[bot]: two");
        assert_eq!(memory.get(8).await, "");
    }

    #[tokio::test]
    async fn per_actor_locks_are_released_after_append() {
        let memory = ConversationMemory::new(Arc::new(InMemoryMemoryStore::new()), 1000);
        for actor_id in 0..500 {
            memory.append(actor_id, "hi", "hello").await;
        }
        assert!(memory.locks.lock().await.is_empty());
        assert_eq!(memory.get(499).await, "[user]: hi\n[bot]: hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_every_exchange_and_release_locks() {
        let memory = Arc::new(ConversationMemory::new(Arc::new(InMemoryMemoryStore::new()), 10_000));
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let memory = memory.clone();
                tokio::spawn(async move { memory.append(1, &format!("m{i}"), "ok").await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let text = memory.get(1).await;
        assert_eq!(text.matches("[bot]: ok").count(), 20);
        assert!(memory.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let memory = ConversationMemory::new(Arc::new(FailingStore), 1000);
        memory.append(7, "hello", "hi").await;
        assert_eq!(memory.get(7).await, "");
    }
}
