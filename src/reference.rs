//! A reference `ChatTransport`/`Repository` pair for local smoke-testing
//! (`antigravity-bridge start`) — one possible implementation of those
//! interfaces, not part of the core. Outbound chat events print to stdout
//! as JSON lines; nothing here survives process restart.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use antigravity_bridge::capability::{ChatTransport, MessageHandle, Repository, UiEventDescriptor};
use antigravity_bridge::model::Session;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum OutboundEvent<'a> {
    Message {
        channel_id: &'a str,
        handle: &'a str,
        content: &'a str,
    },
    Edit {
        handle: &'a str,
        content: &'a str,
    },
    Rich {
        channel_id: &'a str,
        handle: &'a str,
        event: &'a UiEventDescriptor,
    },
}

/// Prints every outbound chat event as a JSON line on stdout.
pub struct StdioChatTransport {
    next_id: Mutex<u64>,
}

impl StdioChatTransport {
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: Mutex::new(0) }
    }

    fn next_handle(&self) -> MessageHandle {
        let mut guard = self.next_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += 1;
        MessageHandle(format!("msg-{guard}"))
    }

    fn emit(event: &OutboundEvent<'_>) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
}

impl Default for StdioChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for StdioChatTransport {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<MessageHandle, String> {
        let handle = self.next_handle();
        Self::emit(&OutboundEvent::Message {
            channel_id,
            handle: &handle.0,
            content,
        });
        Ok(handle)
    }

    async fn edit_message(&self, handle: &MessageHandle, content: &str) -> Result<(), String> {
        Self::emit(&OutboundEvent::Edit {
            handle: &handle.0,
            content,
        });
        Ok(())
    }

    async fn send_rich(
        &self,
        channel_id: &str,
        event: UiEventDescriptor,
    ) -> Result<MessageHandle, String> {
        let handle = self.next_handle();
        Self::emit(&OutboundEvent::Rich {
            channel_id,
            handle: &handle.0,
            event: &event,
        });
        Ok(handle)
    }
}

/// In-memory `Repository`: one workspace binding and one session, enough to
/// drive a single `start` invocation.
pub struct InMemoryRepository {
    bindings: Mutex<HashMap<String, (String, String)>>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn bind(&self, channel_id: &str, workspace_name: &str, guild_id: &str) {
        self.bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(channel_id.to_owned(), (workspace_name.to_owned(), guild_id.to_owned()));
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn workspace_for_channel(&self, channel_id: &str) -> Option<(String, String)> {
        self.bindings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    async fn session_for_channel(&self, channel_id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    async fn save_session(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session.channel_id.clone(), session);
    }
}
