//! Typed operations over the remote chat service.
//!
//! The documents mirror the service schema one-to-one. The adapter
//! relays the opaque `items` payload without interpreting it; decoding
//! happens at the display boundary.

use async_trait::async_trait;
use hypernews_core::{ChatRemote, ChatTurn, HistorySnapshot, RemoteError};
use serde_json::{Value, json};
use tracing::info;

use crate::transport::{GraphqlRequest, GraphqlTransport, Idempotency, TransportError};

const CREATE_CONVERSATION: &str = "\
mutation CreateConversation {
  createConversation
}";

const CONTINUE_CHAT: &str = "\
query ContinueChat($id: String!, $query: String!) {
  continueChat(id: $id, query: $query) {
    items
    conversationId
  }
}";

const CHAT_HISTORY: &str = "\
query ChatHistory($id: String!) {
  chatHistory(id: $id) {
    items
    count
  }
}";

const DELETE_CONVERSATION_HISTORY: &str = "\
mutation DeleteConversationHistory($id: String!) {
  deleteConversationHistory(id: $id)
}";

const DELETE_AGENT: &str = "\
mutation DeleteAgent($id: String!) {
  deleteAgent(id: $id)
}";

/// The production [`ChatRemote`] implementation.
pub struct RemoteSyncAdapter {
    transport: GraphqlTransport,
}

impl RemoteSyncAdapter {
    #[must_use]
    pub const fn new(transport: GraphqlTransport) -> Self {
        Self { transport }
    }
}

/// The service reports a lost session as a GraphQL-level error naming
/// the missing agent, not as a transport failure.
fn is_lost_session(err: &TransportError) -> bool {
    match err {
        TransportError::Graphql { messages } => messages.iter().any(|m| {
            let m = m.to_ascii_lowercase();
            m.contains("not found") || m.contains("no such agent") || m.contains("unknown agent")
        }),
        _ => false,
    }
}

fn map_error(conversation_id: &str, err: TransportError) -> RemoteError {
    if is_lost_session(&err) {
        RemoteError::InvalidConversation(conversation_id.to_string())
    } else {
        RemoteError::Unavailable(anyhow::Error::new(err))
    }
}

fn field<'a>(data: &'a Value, name: &str) -> Result<&'a Value, RemoteError> {
    data.get(name)
        .ok_or_else(|| RemoteError::Unavailable(anyhow::anyhow!("response missing field {name}")))
}

#[async_trait]
impl ChatRemote for RemoteSyncAdapter {
    async fn create_conversation(&self) -> Result<String, RemoteError> {
        let request = GraphqlRequest::new(CREATE_CONVERSATION, Idempotency::Unsafe);
        let data = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RemoteError::Unavailable(anyhow::Error::new(e)))?;

        let id = field(&data, "createConversation")?
            .as_str()
            .ok_or_else(|| {
                RemoteError::Unavailable(anyhow::anyhow!("createConversation is not a string"))
            })?
            .to_string();

        info!("remote allocated conversation {id}");
        Ok(id)
    }

    async fn continue_chat(
        &self,
        conversation_id: &str,
        prompt: &str,
    ) -> Result<ChatTurn, RemoteError> {
        let request = GraphqlRequest::new(CONTINUE_CHAT, Idempotency::Unsafe)
            .with_variables(json!({ "id": conversation_id, "query": prompt }));

        let data = self
            .transport
            .send(&request)
            .await
            .map_err(|e| map_error(conversation_id, e))?;

        let turn: ChatTurn = serde_json::from_value(field(&data, "continueChat")?.clone())
            .map_err(|e| RemoteError::Unavailable(anyhow::Error::new(e)))?;
        Ok(turn)
    }

    async fn fetch_history(&self, agent_id: &str) -> Result<HistorySnapshot, RemoteError> {
        let request = GraphqlRequest::new(CHAT_HISTORY, Idempotency::Safe)
            .with_variables(json!({ "id": agent_id }));

        let data = self
            .transport
            .send(&request)
            .await
            .map_err(|e| map_error(agent_id, e))?;

        let snapshot: HistorySnapshot = serde_json::from_value(field(&data, "chatHistory")?.clone())
            .map_err(|e| RemoteError::Unavailable(anyhow::Error::new(e)))?;
        Ok(snapshot)
    }

    async fn clear_history(&self, agent_id: &str) -> Result<bool, RemoteError> {
        let request = GraphqlRequest::new(DELETE_CONVERSATION_HISTORY, Idempotency::Safe)
            .with_variables(json!({ "id": agent_id }));

        match self.transport.send(&request).await {
            Ok(data) => Ok(field(&data, "deleteConversationHistory")?
                .as_bool()
                .unwrap_or(true)),
            // Delete-if-exists: a session that is already gone counts
            // as success.
            Err(e) if is_lost_session(&e) => Ok(true),
            Err(e) => Err(RemoteError::Unavailable(anyhow::Error::new(e))),
        }
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<bool, RemoteError> {
        let request = GraphqlRequest::new(DELETE_AGENT, Idempotency::Safe)
            .with_variables(json!({ "id": agent_id }));

        match self.transport.send(&request).await {
            Ok(_) => {
                info!("remote agent {agent_id} stopped");
                Ok(true)
            }
            Err(e) if is_lost_session(&e) => Ok(true),
            Err(e) => Err(RemoteError::Unavailable(anyhow::Error::new(e))),
        }
    }
}
