//! Orchestration of user intents against the store and the remote.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::DateTime;
use hypernews_core::{
    ArticleResult, ChatItem, ChatRemote, ConversationIndex, RemoteError, Role,
};
use hypernews_store::{ConversationStore, StoreError, StoreEvent};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::reconciler::SearchResultReconciler;

/// Placeholder text shown while a turn is in flight.
const SEARCHING_TEXT: &str = "Searching for articles...";

/// Errors surfaced to the caller of a coordinator intent. Remote and
/// store failures inside a turn are not errors here: they end as
/// chat-visible items instead.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no active conversation to submit into")]
    NoActiveConversation,
}

/// Terminal disposition of one submit intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Reply appended locally and acknowledged remotely.
    Confirmed,
    /// Remote call failed; a synthetic error item stands in for the
    /// reply. The user's own item stays committed.
    Failed,
    /// Empty input; nothing was sent.
    Ignored,
    /// A turn for this conversation was already in flight; submission
    /// is ignored, not queued.
    Busy,
    /// The response no longer matched the conversation's generation
    /// (deleted mid-flight) and was not applied.
    Discarded,
}

#[derive(Debug, Default)]
struct Turn {
    generation: u64,
    in_flight: bool,
}

/// Mediator owning both the local store and the remote adapter.
///
/// At most one outbound turn per conversation is in flight at a time;
/// different conversations proceed independently. Responses are
/// correlated by a per-conversation generation counter so a late reply
/// can never be applied after the conversation it belonged to is gone.
pub struct SyncCoordinator<R: ChatRemote> {
    remote: R,
    store: Mutex<ConversationStore>,
    reconciler: SearchResultReconciler,
    turns: Mutex<HashMap<String, Turn>>,
}

impl<R: ChatRemote> SyncCoordinator<R> {
    #[must_use]
    pub fn new(remote: R, store: ConversationStore) -> Self {
        Self {
            remote,
            store: Mutex::new(store),
            reconciler: SearchResultReconciler::new(),
            turns: Mutex::new(HashMap::new()),
        }
    }

    /// Change feed of the underlying store.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.lock_store().subscribe()
    }

    /// Snapshot of the conversation list in insertion order.
    #[must_use]
    pub fn conversations(&self) -> ConversationIndex {
        self.lock_store().list_conversations()
    }

    /// Items of the active conversation, including the transient
    /// pending placeholder while a turn is in flight. The placeholder
    /// lives only here; the store never persists it.
    #[must_use]
    pub fn active_items(&self) -> Vec<ChatItem> {
        let store = self.lock_store();
        let Some(conversation) = store.active_conversation() else {
            return Vec::new();
        };
        let mut items = conversation.items.clone();
        let id = conversation.id.clone();
        drop(store);

        let in_flight = self
            .lock_turns()
            .get(&id)
            .is_some_and(|turn| turn.in_flight);
        if in_flight {
            items.push(ChatItem::pending(Role::Assistant, SEARCHING_TEXT));
        }
        items
    }

    /// Latest reconciled article results, or `None` when the last reply
    /// carried no result payload.
    #[must_use]
    pub fn latest_results(&self) -> Option<Vec<ArticleResult>> {
        self.reconciler.latest()
    }

    /// Read access to the store for the rendering surface.
    pub fn with_store<T>(&self, f: impl FnOnce(&ConversationStore) -> T) -> T {
        f(&self.lock_store())
    }

    /// Starts a conversation: the remote allocates the id first, and
    /// only confirmed remote existence creates the local record. A
    /// local-only conversation the remote cannot continue is never
    /// possible on this path.
    pub async fn new_conversation(&self) -> Result<String, SyncError> {
        let id = self.remote.create_conversation().await?;
        self.lock_store().create_conversation(&id);
        info!("conversation {id} created and active");
        Ok(id)
    }

    /// Makes a known conversation active, or deselects with `None`.
    pub fn select_conversation(&self, id: Option<&str>) -> Result<(), SyncError> {
        self.lock_store().set_active(id)?;
        Ok(())
    }

    /// Submits one prompt into the active conversation.
    ///
    /// The user's item is committed locally before the remote call:
    /// local echo of the user's own input is not conditional on network
    /// success. Failures append a synthetic assistant item so the
    /// conversation stays a complete audit trail.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, SyncError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let conversation_id = self
            .lock_store()
            .list_conversations()
            .active_id
            .ok_or(SyncError::NoActiveConversation)?;

        let generation = {
            let mut turns = self.lock_turns();
            let turn = turns.entry(conversation_id.clone()).or_default();
            if turn.in_flight {
                debug!("turn already in flight for {conversation_id}, ignoring submit");
                return Ok(SubmitOutcome::Busy);
            }
            turn.in_flight = true;
            turn.generation
        };

        if let Err(e) = self
            .lock_store()
            .append_item(&conversation_id, ChatItem::new(Role::User, text))
        {
            self.finish_turn(&conversation_id, generation);
            return Err(e.into());
        }

        let reply = self.remote.continue_chat(&conversation_id, text).await;

        if !self.finish_turn(&conversation_id, generation) {
            debug!("discarding stale reply for {conversation_id}");
            return Ok(SubmitOutcome::Discarded);
        }

        match reply {
            Ok(turn) => {
                // Forward the payload to the reconciler regardless of
                // shape; a plain-text reply simply decodes to nothing.
                self.reconciler.reconcile(&turn.items);
                self.lock_store()
                    .append_item(&conversation_id, ChatItem::new(Role::Assistant, turn.items))?;
                Ok(SubmitOutcome::Confirmed)
            }
            Err(e) => {
                warn!("turn failed for {conversation_id}: {e}");
                let text = match &e {
                    RemoteError::InvalidConversation(_) => {
                        "This conversation is no longer available on the server. \
                         Start a new conversation to continue."
                            .to_string()
                    }
                    RemoteError::Unavailable(_) => format!("Error fetching results: {e}"),
                };
                self.lock_store()
                    .append_item(&conversation_id, ChatItem::new(Role::Assistant, text))?;
                Ok(SubmitOutcome::Failed)
            }
        }
    }

    /// Deletes a conversation remotely and locally, or neither: a
    /// failed remote delete keeps the local record, so the only copy of
    /// an un-deleted remote conversation is never lost.
    pub async fn delete_conversation(&self, id: &str) -> Result<(), SyncError> {
        self.remote.clear_history(id).await?;
        self.remote.delete_agent(id).await?;

        // Any in-flight reply for this conversation is now stale.
        self.lock_turns().remove(id);
        self.lock_store().delete_conversation(id);
        Ok(())
    }

    /// Reconciles the local log with the remote history snapshot; the
    /// remote is the source of truth for long-term history. Adopts the
    /// snapshot only when it holds more than the local log.
    pub async fn sync_from_remote(&self, id: &str) -> Result<usize, SyncError> {
        let snapshot = self.remote.fetch_history(id).await?;
        let items = decode_history_items(&snapshot.items);

        let mut store = self.lock_store();
        let local_len = store.conversation(id).map_or(0, |c| c.items.len());
        if items.len() > local_len {
            info!(
                "adopting remote history for {id}: {} items (local had {local_len})",
                items.len()
            );
            let adopted = items.len();
            store.replace_items(id, items)?;
            Ok(adopted)
        } else {
            Ok(local_len)
        }
    }

    /// Marks the turn resolved; `false` means the response is stale and
    /// must not be applied.
    fn finish_turn(&self, conversation_id: &str, generation: u64) -> bool {
        let mut turns = self.lock_turns();
        match turns.get_mut(conversation_id) {
            Some(turn) if turn.in_flight && turn.generation == generation => {
                turn.in_flight = false;
                turn.generation += 1;
                true
            }
            _ => false,
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, ConversationStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_turns(&self) -> MutexGuard<'_, HashMap<String, Turn>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Decodes a remote history snapshot into displayable chat items.
/// Entries that are not message items (tool calls, cards) are display
/// artifacts of past turns and are skipped; decoding is defensive and
/// never fails.
fn decode_history_items(raw: &str) -> Vec<ChatItem> {
    let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(raw) else {
        debug!("remote history payload is not an item array");
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| {
            matches!(
                entry.get("type").and_then(Value::as_str),
                Some("message") | None
            )
        })
        .filter_map(|entry| {
            let text = entry.get("content").and_then(Value::as_str)?;
            let role = match entry.get("role").and_then(Value::as_str)? {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => return None,
            };
            let timestamp = entry
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map_or_else(chrono::Utc::now, |t| t.with_timezone(&chrono::Utc));
            Some(ChatItem {
                role,
                text: text.to_string(),
                timestamp,
                pending: false,
            })
        })
        .collect()
}
