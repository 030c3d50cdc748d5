//! Capability traits for the external collaborators this crate depends on:
//! the chat front-end and persistent storage. The core consumes these
//! interfaces; it never implements them for production use (`cli`/`main.rs`
//! wires in an in-memory reference pair for local smoke-testing).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque handle to a previously-sent chat message, returned by `send_message`
/// and required by `edit_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHandle(pub String);

/// A rendered interactive UI event (approval, planning, error popup) handed
/// to the chat transport for display. A closed, tagged sum type so the
/// transport can render each variant without guessing its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UiEventDescriptor {
    Approval {
        title: String,
        body: String,
        approve_label: String,
        deny_label: String,
    },
    Planning {
        title: String,
        body: String,
    },
    ErrorPopup {
        title: String,
        body: String,
    },
}

/// A button click reported by the chat transport, routed back to the
/// `SessionBridge` that owns the originating `UiEventDescriptor`.
#[derive(Debug, Clone)]
pub struct ButtonClick {
    pub channel_id: String,
    pub button_id: String,
}

/// The chat front-end's interface to the core.
///
/// Any chat system satisfying this composes; Discord specifics (slash
/// commands, gateway intents, embeds) stay entirely outside the core.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<MessageHandle, String>;
    async fn edit_message(&self, handle: &MessageHandle, content: &str) -> Result<(), String>;
    async fn send_rich(
        &self,
        channel_id: &str,
        event: UiEventDescriptor,
    ) -> Result<MessageHandle, String>;
}

/// Persistent-state interface to the core: workspace bindings, chat-session
/// records, template catalog, schedules. Storage format is not prescribed —
/// only the shape of reads/writes the core needs.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Resolve a channel binding to its workspace path and guild id.
    async fn workspace_for_channel(&self, channel_id: &str) -> Option<(String, String)>;

    /// Load the chat-session record for a channel, if one exists.
    async fn session_for_channel(&self, channel_id: &str) -> Option<crate::model::Session>;

    /// Persist a chat-session record, creating or updating it.
    async fn save_session(&self, session: crate::model::Session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRepository {
        bindings: Mutex<std::collections::HashMap<String, (String, String)>>,
        sessions: Mutex<std::collections::HashMap<String, crate::model::Session>>,
    }

    #[async_trait]
    impl Repository for FakeRepository {
        async fn workspace_for_channel(&self, channel_id: &str) -> Option<(String, String)> {
            self.bindings.lock().unwrap().get(channel_id).cloned()
        }

        async fn session_for_channel(&self, channel_id: &str) -> Option<crate::model::Session> {
            self.sessions.lock().unwrap().get(channel_id).cloned()
        }

        async fn save_session(&self, session: crate::model::Session) {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.channel_id.clone(), session);
        }
    }

    #[tokio::test]
    async fn repository_round_trips_session() {
        let repo = FakeRepository {
            bindings: Mutex::new(std::collections::HashMap::new()),
            sessions: Mutex::new(std::collections::HashMap::new()),
        };
        let session = crate::model::Session {
            title: "Fix the bug".into(),
            workspace_name: "my-repo".into(),
            channel_id: "chan-1".into(),
            is_renamed: false,
        };
        repo.save_session(session.clone()).await;
        let loaded = repo.session_for_channel("chan-1").await.unwrap();
        assert_eq!(loaded.title, "Fix the bug");
    }

    #[tokio::test]
    async fn repository_returns_none_for_unknown_channel() {
        let repo = FakeRepository {
            bindings: Mutex::new(std::collections::HashMap::new()),
            sessions: Mutex::new(std::collections::HashMap::new()),
        };
        assert!(repo.workspace_for_channel("missing").await.is_none());
    }

    struct FakeChatTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatTransport for FakeChatTransport {
        async fn send_message(
            &self,
            channel_id: &str,
            content: &str,
        ) -> Result<MessageHandle, String> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_owned(), content.to_owned()));
            Ok(MessageHandle(format!("{channel_id}-{}", self.sent.lock().unwrap().len())))
        }

        async fn edit_message(&self, _handle: &MessageHandle, _content: &str) -> Result<(), String> {
            Ok(())
        }

        async fn send_rich(
            &self,
            channel_id: &str,
            _event: UiEventDescriptor,
        ) -> Result<MessageHandle, String> {
            self.send_message(channel_id, "[rich event]").await
        }
    }

    #[tokio::test]
    async fn chat_transport_send_message_returns_handle() {
        let transport = FakeChatTransport {
            sent: Mutex::new(Vec::new()),
        };
        let handle = transport.send_message("chan-1", "hello").await.unwrap();
        assert_eq!(handle.0, "chan-1-1");
    }
}
