#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Shared data model for the HyperNews conversation sync engine.
//!
//! Conversations are identified by the remote chat service; the local
//! side never mints ids of its own. Everything here is plain data plus
//! the [`ChatRemote`] seam that the sync coordinator talks through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn within a conversation.
///
/// Ordering is insertion order; `timestamp` is display-only. The
/// `pending` flag marks a turn whose outbound call has not resolved yet
/// and is deliberately skipped by serde so it can never survive a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatItem {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub pending: bool,
}

impl ChatItem {
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            pending: false,
        }
    }

    /// A placeholder for an unresolved outbound turn.
    #[must_use]
    pub fn pending(role: Role, text: impl Into<String>) -> Self {
        Self {
            pending: true,
            ..Self::new(role, text)
        }
    }
}

/// A remotely-identified thread of chat turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque id assigned by the remote service at creation time.
    pub id: String,
    /// Remote agent session correlated with this conversation. Equal to
    /// `id` under the current protocol.
    pub agent_id: String,
    pub items: Vec<ChatItem>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Conversation {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let now = Utc::now();
        Self {
            agent_id: id.clone(),
            id,
            items: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }
}

/// The ordered set of known conversations plus the active pointer.
///
/// `ids` preserves insertion order for list display; `active_id` always
/// references a member of `ids` or is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationIndex {
    pub ids: Vec<String>,
    pub active_id: Option<String>,
}

/// One article reference extracted from an agent reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleResult {
    pub uid: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_: String,
    #[serde(default)]
    pub url: String,
}

/// Reply to a continue-chat call. `items` is an opaque JSON payload the
/// adapter relays without interpreting; the reconciler decodes it at the
/// display boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub items: String,
    pub conversation_id: String,
}

/// Long-term history held by the remote agent session.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySnapshot {
    pub items: String,
    pub count: usize,
}

/// Failures surfaced by the remote chat service.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Retry budget spent or the service rejected the call outright.
    #[error("remote chat service unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    /// The remote no longer recognizes this conversation id. Surfaced
    /// distinctly so the coordinator can offer a fresh start instead of
    /// retrying forever.
    #[error("remote does not recognize conversation: {0}")]
    InvalidConversation(String),
}

/// The five operations of the remote chat service.
///
/// Implemented by the GraphQL adapter in production and by scripted
/// fakes in tests; the coordinator only ever sees this trait.
#[async_trait]
pub trait ChatRemote: Send + Sync {
    /// Ask the remote to allocate a fresh conversation, returning its id.
    async fn create_conversation(&self) -> Result<String, RemoteError>;

    /// Send one prompt into an existing conversation.
    async fn continue_chat(
        &self,
        conversation_id: &str,
        prompt: &str,
    ) -> Result<ChatTurn, RemoteError>;

    /// Fetch the remote item log for an agent session. Idempotent.
    async fn fetch_history(&self, agent_id: &str) -> Result<HistorySnapshot, RemoteError>;

    /// Clear the remote item log. Delete-if-exists: succeeds again after
    /// success.
    async fn clear_history(&self, agent_id: &str) -> Result<bool, RemoteError>;

    /// Stop the remote agent session. Same idempotence rule as
    /// [`Self::clear_history`].
    async fn delete_agent(&self, agent_id: &str) -> Result<bool, RemoteError>;
}
