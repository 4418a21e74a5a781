#![allow(clippy::unwrap_used)]

//! End-to-end coordinator flows against a scripted remote.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hypernews_core::{ChatRemote, ChatTurn, HistorySnapshot, RemoteError, Role};
use hypernews_store::{ConversationStore, MemoryStore};
use hypernews_sync::{SubmitOutcome, SyncCoordinator, SyncError};
use tokio::sync::Notify;

/// Scripted [`ChatRemote`]: replies are consumed front to back, and the
/// optional notify pair lets a test hold a turn in flight.
#[derive(Default)]
struct FakeRemote {
    replies: Mutex<VecDeque<Result<String, String>>>,
    history: Mutex<String>,
    clear_fails: bool,
    entered: Option<Arc<Notify>>,
    release: Option<Arc<Notify>>,
}

impl FakeRemote {
    fn replying(payloads: &[Result<&str, &str>]) -> Self {
        Self {
            replies: Mutex::new(
                payloads
                    .iter()
                    .map(|r| match r {
                        Ok(p) => Ok((*p).to_string()),
                        Err(e) => Err((*e).to_string()),
                    })
                    .collect(),
            ),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatRemote for FakeRemote {
    async fn create_conversation(&self) -> Result<String, RemoteError> {
        Ok("c1".to_string())
    }

    async fn continue_chat(
        &self,
        conversation_id: &str,
        _prompt: &str,
    ) -> Result<ChatTurn, RemoteError> {
        if let Some(entered) = &self.entered {
            entered.notify_one();
        }
        if let Some(release) = &self.release {
            release.notified().await;
        }

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(items)) => Ok(ChatTurn {
                items,
                conversation_id: conversation_id.to_string(),
            }),
            Some(Err(message)) => Err(RemoteError::Unavailable(anyhow::anyhow!(message))),
            None => panic!("unscripted continue_chat call"),
        }
    }

    async fn fetch_history(&self, _agent_id: &str) -> Result<HistorySnapshot, RemoteError> {
        let items = self.history.lock().unwrap().clone();
        Ok(HistorySnapshot { items, count: 0 })
    }

    async fn clear_history(&self, _agent_id: &str) -> Result<bool, RemoteError> {
        if self.clear_fails {
            Err(RemoteError::Unavailable(anyhow::anyhow!(
                "service unreachable"
            )))
        } else {
            Ok(true)
        }
    }

    async fn delete_agent(&self, _agent_id: &str) -> Result<bool, RemoteError> {
        Ok(true)
    }
}

fn fresh_store() -> ConversationStore {
    let mut store = ConversationStore::new(Box::new(MemoryStore::new()), "hypernews");
    store.initialize().unwrap();
    store
}

#[tokio::test]
async fn create_then_submit_round_trip() {
    let remote = FakeRemote::replying(&[Ok("hi there")]);
    let coordinator = SyncCoordinator::new(remote, fresh_store());

    let id = coordinator.new_conversation().await.unwrap();
    assert_eq!(id, "c1");
    assert_eq!(
        coordinator.conversations().active_id.as_deref(),
        Some("c1")
    );

    let outcome = coordinator.submit("hello").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Confirmed);

    let items = coordinator.active_items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].role, Role::User);
    assert_eq!(items[0].text, "hello");
    assert_eq!(items[1].role, Role::Assistant);
    assert_eq!(items[1].text, "hi there");
    assert!(items.iter().all(|item| !item.pending));

    // A plain-text reply carries no article results.
    assert!(coordinator.latest_results().is_none());
}

#[tokio::test]
async fn failed_turn_leaves_user_item_and_one_error_item() {
    let remote = FakeRemote::replying(&[Err("connection refused")]);
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();

    let outcome = coordinator.submit("hello").await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Failed);

    let items = coordinator.active_items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].text, "hello");
    assert_eq!(items[1].role, Role::Assistant);
    assert!(items[1].text.starts_with("Error fetching results:"));
    assert!(!items[1].pending);
}

#[tokio::test]
async fn blank_submissions_are_ignored() {
    let remote = FakeRemote::replying(&[]);
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();

    assert_eq!(
        coordinator.submit("   ").await.unwrap(),
        SubmitOutcome::Ignored
    );
    assert!(coordinator.active_items().is_empty());
}

#[tokio::test]
async fn submit_without_active_conversation_is_an_error() {
    let remote = FakeRemote::replying(&[]);
    let coordinator = SyncCoordinator::new(remote, fresh_store());

    let err = coordinator.submit("hello").await.unwrap_err();
    assert!(matches!(err, SyncError::NoActiveConversation));
}

#[tokio::test]
async fn article_results_from_a_reply_are_published() {
    let payload = r#"[{"uid":"0x1","title":"quantum leap","url":"u"}]"#;
    let remote = FakeRemote::replying(&[Ok(payload)]);
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();

    coordinator.submit("quantum computing").await.unwrap();

    let results = coordinator.latest_results().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].uid, "0x1");
    assert_eq!(results[0].title, "quantum leap");
}

#[tokio::test]
async fn failed_remote_delete_keeps_the_local_record() {
    let remote = FakeRemote {
        clear_fails: true,
        ..FakeRemote::default()
    };
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();

    let err = coordinator.delete_conversation("c1").await.unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));

    let index = coordinator.conversations();
    assert_eq!(index.ids, ["c1"]);
    assert_eq!(index.active_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn reply_arriving_after_delete_is_discarded() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let remote = FakeRemote {
        entered: Some(Arc::clone(&entered)),
        release: Some(Arc::clone(&release)),
        ..FakeRemote::replying(&[Ok("too late")])
    };
    let coordinator = Arc::new(SyncCoordinator::new(remote, fresh_store()));
    coordinator.new_conversation().await.unwrap();

    let submitting = Arc::clone(&coordinator);
    let turn = tokio::spawn(async move { submitting.submit("hello").await });

    entered.notified().await;
    coordinator.delete_conversation("c1").await.unwrap();
    release.notify_one();

    let outcome = turn.await.unwrap().unwrap();
    assert_eq!(outcome, SubmitOutcome::Discarded);
    assert!(coordinator.conversations().ids.is_empty());
}

#[tokio::test]
async fn second_submit_while_in_flight_is_ignored_not_queued() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let remote = FakeRemote {
        entered: Some(Arc::clone(&entered)),
        release: Some(Arc::clone(&release)),
        ..FakeRemote::replying(&[Ok("first reply")])
    };
    let coordinator = Arc::new(SyncCoordinator::new(remote, fresh_store()));
    coordinator.new_conversation().await.unwrap();

    let submitting = Arc::clone(&coordinator);
    let turn = tokio::spawn(async move { submitting.submit("first").await });

    entered.notified().await;
    assert_eq!(
        coordinator.submit("second").await.unwrap(),
        SubmitOutcome::Busy
    );

    // The in-flight turn shows as a pending placeholder, last.
    let items = coordinator.active_items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].text, "first");
    assert!(items[1].pending);
    assert_eq!(items[1].text, "Searching for articles...");

    release.notify_one();
    assert_eq!(turn.await.unwrap().unwrap(), SubmitOutcome::Confirmed);

    // Exactly one turn happened; the rejected submit left no trace.
    let texts: Vec<String> = coordinator
        .active_items()
        .iter()
        .map(|item| item.text.clone())
        .collect();
    assert_eq!(texts, ["first", "first reply"]);
}

#[tokio::test]
async fn longer_remote_history_is_adopted() {
    let remote = FakeRemote {
        history: Mutex::new(
            r#"[
                {"type":"message","content":"hello","role":"user"},
                {"type":"message","content":"hi there","role":"assistant"},
                {"type":"message","content":"more?","role":"user"}
            ]"#
            .to_string(),
        ),
        ..FakeRemote::replying(&[Err("offline")])
    };
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();

    // Local log holds two items: the prompt and the failure stand-in.
    coordinator.submit("hello").await.unwrap();
    assert_eq!(coordinator.active_items().len(), 2);

    let adopted = coordinator.sync_from_remote("c1").await.unwrap();
    assert_eq!(adopted, 3);

    let items = coordinator.active_items();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].text, "more?");
}

#[tokio::test]
async fn shorter_remote_history_is_not_adopted() {
    let remote = FakeRemote {
        history: Mutex::new(r#"[{"type":"message","content":"hello","role":"user"}]"#.to_string()),
        ..FakeRemote::replying(&[Ok("hi there")])
    };
    let coordinator = SyncCoordinator::new(remote, fresh_store());
    coordinator.new_conversation().await.unwrap();
    coordinator.submit("hello").await.unwrap();

    let kept = coordinator.sync_from_remote("c1").await.unwrap();
    assert_eq!(kept, 2);
    assert_eq!(coordinator.active_items().len(), 2);
}
