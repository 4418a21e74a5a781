//! The conversation store: pure local CRUD plus change notification.

use std::collections::HashMap;

use hypernews_core::{ChatItem, Conversation, ConversationIndex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::substrate::{KeyValueStore, SubstrateError};

/// Errors raised by [`ConversationStore`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The substrate could not be read at initialization. The store
    /// keeps working in memory-only mode for the session.
    #[error("local persistence substrate unavailable: {0}")]
    StorageUnavailable(#[source] SubstrateError),

    /// The caller referenced a conversation the store does not hold.
    /// Fatal to the calling operation, not to the process.
    #[error("unknown conversation: {0}")]
    UnknownConversation(String),
}

/// Whether mutations reach the substrate or stay in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Durable,
    MemoryOnly,
}

/// Change notifications consumed by the rendering surface.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    ConversationCreated(String),
    ItemAppended(String),
    ItemsReplaced(String),
    ConversationDeleted(String),
    ActiveChanged(Option<String>),
}

/// Local durable record of conversations and their item logs.
///
/// Owns the substrate exclusively. Substrate schema, derived from the
/// configured namespace `ns`:
///
/// - `{ns}_conversations`: insertion-ordered conversation ids
/// - `{ns}_active_chat`: the active conversation pointer
/// - `{ns}_chat_{id}`: one serialized [`Conversation`] per id
pub struct ConversationStore {
    substrate: Box<dyn KeyValueStore>,
    namespace: String,
    mode: StorageMode,
    index: ConversationIndex,
    conversations: HashMap<String, Conversation>,
    events: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    #[must_use]
    pub fn new(substrate: Box<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            substrate,
            namespace: namespace.into(),
            mode: StorageMode::Durable,
            index: ConversationIndex::default(),
            conversations: HashMap::new(),
            events,
        }
    }

    /// Loads the index, the active pointer, and every item log into
    /// memory. On a substrate failure the store switches to memory-only
    /// mode and reports [`StoreError::StorageUnavailable`]; it stays
    /// usable either way (degrade, don't crash).
    pub fn initialize(&mut self) -> Result<(), StoreError> {
        match self.load_all() {
            Ok(()) => {
                info!(
                    conversations = self.index.ids.len(),
                    "conversation store initialized"
                );
                Ok(())
            }
            Err(e) => {
                warn!("substrate unavailable, continuing memory-only: {e}");
                self.mode = StorageMode::MemoryOnly;
                self.index = ConversationIndex::default();
                self.conversations.clear();
                Err(StoreError::StorageUnavailable(e))
            }
        }
    }

    fn load_all(&mut self) -> Result<(), SubstrateError> {
        let ids: Vec<String> = match self.substrate.get(&self.index_key())? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("discarding corrupt conversation index: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut conversations = HashMap::new();
        let mut kept = Vec::new();
        for id in ids {
            if kept.contains(&id) {
                continue;
            }
            match self.substrate.get(&self.log_key(&id))? {
                Some(raw) => match serde_json::from_str::<Conversation>(&raw) {
                    Ok(conversation) => {
                        conversations.insert(id.clone(), conversation);
                        kept.push(id);
                    }
                    Err(e) => warn!("discarding corrupt item log for {id}: {e}"),
                },
                // Indexed but never written; treat as absent.
                None => debug!("no item log for indexed conversation {id}"),
            }
        }

        let active_id = self
            .substrate
            .get(&self.active_key())?
            .filter(|id| kept.contains(id));

        self.index = ConversationIndex {
            ids: kept,
            active_id,
        };
        self.conversations = conversations;
        Ok(())
    }

    /// Current persistence mode; `MemoryOnly` after degradation.
    #[must_use]
    pub const fn mode(&self) -> StorageMode {
        self.mode
    }

    /// Change feed for the rendering surface.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the index in insertion order.
    #[must_use]
    pub fn list_conversations(&self) -> ConversationIndex {
        self.index.clone()
    }

    #[must_use]
    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    #[must_use]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.index
            .active_id
            .as_deref()
            .and_then(|id| self.conversations.get(id))
    }

    /// Records a remotely-created conversation and makes it active.
    /// Idempotent: a second call with a known id is a complete no-op.
    pub fn create_conversation(&mut self, id: &str) {
        if self.conversations.contains_key(id) {
            debug!("conversation {id} already present, ignoring create");
            return;
        }

        self.conversations
            .insert(id.to_string(), Conversation::new(id));
        self.index.ids.push(id.to_string());
        self.index.active_id = Some(id.to_string());

        self.persist_log(id);
        self.persist_index();
        self.persist_active();

        info!("created conversation {id}");
        self.emit(StoreEvent::ConversationCreated(id.to_string()));
        self.emit(StoreEvent::ActiveChanged(Some(id.to_string())));
    }

    /// Appends one turn to an existing conversation's log.
    pub fn append_item(&mut self, id: &str, item: ChatItem) -> Result<(), StoreError> {
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

        conversation.items.push(item);
        conversation.last_active_at = chrono::Utc::now();

        self.persist_log(id);
        self.emit(StoreEvent::ItemAppended(id.to_string()));
        Ok(())
    }

    /// Adopts a reconciled history snapshot as the new local log. Only
    /// the reload-reconciliation path uses this; everything else is
    /// append-only.
    pub fn replace_items(&mut self, id: &str, items: Vec<ChatItem>) -> Result<(), StoreError> {
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConversation(id.to_string()))?;

        conversation.items = items;
        conversation.last_active_at = chrono::Utc::now();

        self.persist_log(id);
        self.emit(StoreEvent::ItemsReplaced(id.to_string()));
        Ok(())
    }

    /// Removes a conversation and its log. Idempotent; clears the active
    /// pointer when it referenced the deleted id.
    pub fn delete_conversation(&mut self, id: &str) {
        if self.conversations.remove(id).is_none() {
            return;
        }
        self.index.ids.retain(|known| known != id);

        if self.index.active_id.as_deref() == Some(id) {
            self.index.active_id = None;
            self.persist_active();
            self.emit(StoreEvent::ActiveChanged(None));
        }

        self.remove_log(id);
        self.persist_index();

        info!("deleted conversation {id}");
        self.emit(StoreEvent::ConversationDeleted(id.to_string()));
    }

    /// Moves the active pointer. `None` deselects.
    pub fn set_active(&mut self, id: Option<&str>) -> Result<(), StoreError> {
        if let Some(id) = id {
            if !self.conversations.contains_key(id) {
                return Err(StoreError::UnknownConversation(id.to_string()));
            }
        }

        self.index.active_id = id.map(ToString::to_string);
        self.persist_active();
        self.emit(StoreEvent::ActiveChanged(self.index.active_id.clone()));
        Ok(())
    }

    fn emit(&self, event: StoreEvent) {
        // Nobody listening is fine; the surface subscribes lazily.
        let _ = self.events.send(event);
    }

    fn index_key(&self) -> String {
        format!("{}_conversations", self.namespace)
    }

    fn active_key(&self) -> String {
        format!("{}_active_chat", self.namespace)
    }

    fn log_key(&self, id: &str) -> String {
        format!("{}_chat_{id}", self.namespace)
    }

    fn persist_index(&mut self) {
        if let Ok(raw) = serde_json::to_string(&self.index.ids) {
            let key = self.index_key();
            self.write(&key, &raw);
        }
    }

    fn persist_active(&mut self) {
        let key = self.active_key();
        match self.index.active_id.clone() {
            Some(id) => self.write(&key, &id),
            None => self.erase(&key),
        }
    }

    fn persist_log(&mut self, id: &str) {
        let Some(conversation) = self.conversations.get(id) else {
            return;
        };
        if let Ok(raw) = serde_json::to_string(conversation) {
            let key = self.log_key(id);
            self.write(&key, &raw);
        }
    }

    fn remove_log(&mut self, id: &str) {
        let key = self.log_key(id);
        self.erase(&key);
    }

    fn write(&mut self, key: &str, value: &str) {
        if self.mode == StorageMode::MemoryOnly {
            return;
        }
        if let Err(e) = self.substrate.set(key, value) {
            warn!("substrate write failed, degrading to memory-only: {e}");
            self.mode = StorageMode::MemoryOnly;
        }
    }

    fn erase(&mut self, key: &str) {
        if self.mode == StorageMode::MemoryOnly {
            return;
        }
        if let Err(e) = self.substrate.remove(key) {
            warn!("substrate remove failed, degrading to memory-only: {e}");
            self.mode = StorageMode::MemoryOnly;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::substrate::MemoryStore;
    use hypernews_core::{ChatItem, Role};

    fn store() -> ConversationStore {
        let mut store = ConversationStore::new(Box::new(MemoryStore::new()), "hypernews");
        store.initialize().unwrap();
        store
    }

    struct BrokenSubstrate;

    impl KeyValueStore for BrokenSubstrate {
        fn get(&self, _key: &str) -> Result<Option<String>, SubstrateError> {
            Err(std::io::Error::other("quota exhausted").into())
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), SubstrateError> {
            Err(std::io::Error::other("quota exhausted").into())
        }
        fn remove(&self, _key: &str) -> Result<(), SubstrateError> {
            Err(std::io::Error::other("quota exhausted").into())
        }
    }

    #[test]
    fn append_preserves_call_order() {
        let mut store = store();
        store.create_conversation("c1");

        for i in 0..5 {
            store
                .append_item("c1", ChatItem::new(Role::User, format!("m{i}")))
                .unwrap();
        }

        let texts: Vec<&str> = store
            .conversation("c1")
            .unwrap()
            .items
            .iter()
            .map(|item| item.text.as_str())
            .collect();
        assert_eq!(texts, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn create_is_idempotent() {
        let mut store = store();
        store.create_conversation("c1");
        store.create_conversation("c1");

        assert_eq!(store.list_conversations().ids, ["c1"]);
    }

    #[test]
    fn double_delete_is_idempotent_and_clears_active() {
        let mut store = store();
        store.create_conversation("c1");
        assert_eq!(store.list_conversations().active_id.as_deref(), Some("c1"));

        store.delete_conversation("c1");
        store.delete_conversation("c1");

        let index = store.list_conversations();
        assert!(index.ids.is_empty());
        assert!(index.active_id.is_none());
    }

    #[test]
    fn append_to_unknown_conversation_fails() {
        let mut store = store();
        let err = store
            .append_item("ghost", ChatItem::new(Role::User, "hi"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownConversation(id) if id == "ghost"));
    }

    #[test]
    fn set_active_rejects_dangling_reference() {
        let mut store = store();
        store.create_conversation("c1");

        assert!(store.set_active(Some("ghost")).is_err());
        // Failed mutation leaves the pointer alone.
        assert_eq!(store.list_conversations().active_id.as_deref(), Some("c1"));

        store.set_active(None).unwrap();
        assert!(store.list_conversations().active_id.is_none());
    }

    #[test]
    fn reload_recovers_persisted_state() {
        let substrate = MemoryStore::new();

        let mut store = ConversationStore::new(Box::new(substrate.clone()), "hypernews");
        store.initialize().unwrap();
        store.create_conversation("c1");
        store
            .append_item("c1", ChatItem::new(Role::User, "hello"))
            .unwrap();
        store
            .append_item("c1", ChatItem::new(Role::Assistant, "hi there"))
            .unwrap();

        let mut reopened = ConversationStore::new(Box::new(substrate), "hypernews");
        reopened.initialize().unwrap();

        let index = reopened.list_conversations();
        assert_eq!(index.ids, ["c1"]);
        assert_eq!(index.active_id.as_deref(), Some("c1"));

        let items = &reopened.conversation("c1").unwrap().items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "hello");
        assert_eq!(items[1].text, "hi there");
    }

    #[test]
    fn broken_substrate_degrades_to_memory_only() {
        let mut store = ConversationStore::new(Box::new(BrokenSubstrate), "hypernews");
        let err = store.initialize().unwrap_err();
        assert!(matches!(err, StoreError::StorageUnavailable(_)));
        assert_eq!(store.mode(), StorageMode::MemoryOnly);

        // Still fully usable in memory.
        store.create_conversation("c1");
        store
            .append_item("c1", ChatItem::new(Role::User, "hello"))
            .unwrap();
        assert_eq!(store.conversation("c1").unwrap().items.len(), 1);
    }

    #[test]
    fn mutations_emit_change_events() {
        let mut store = store();
        let mut events = store.subscribe();

        store.create_conversation("c1");
        assert!(matches!(
            events.try_recv().unwrap(),
            StoreEvent::ConversationCreated(id) if id == "c1"
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            StoreEvent::ActiveChanged(Some(id)) if id == "c1"
        ));

        store
            .append_item("c1", ChatItem::new(Role::User, "hello"))
            .unwrap();
        assert!(matches!(
            events.try_recv().unwrap(),
            StoreEvent::ItemAppended(id) if id == "c1"
        ));
    }

    #[test]
    fn corrupt_index_is_discarded_not_fatal() {
        let substrate = MemoryStore::new();
        substrate.set("hypernews_conversations", "not json").unwrap();

        let mut store = ConversationStore::new(Box::new(substrate), "hypernews");
        store.initialize().unwrap();
        assert!(store.list_conversations().ids.is_empty());
        assert_eq!(store.mode(), StorageMode::Durable);
    }
}
