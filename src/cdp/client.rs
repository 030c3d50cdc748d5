use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, Instant};

use super::context::{ContextRegistry, spawn_context_tracker};
use super::discover::discover;
use super::error::CdpError;
use super::transport::{
    LifecycleEvent, ReconnectConfig, TransportCommand, TransportHandle, spawn_transport,
};
use super::types::CdpEvent;

/// Configuration for a CDP client connection.
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Timeout for the initial WebSocket connection (default: 10s).
    pub connect_timeout: Duration,
    /// Timeout for individual CDP commands (default: 30s).
    pub command_timeout: Duration,
    /// Capacity of the internal command channel (default: 256).
    pub channel_capacity: usize,
    /// Reconnection settings.
    pub reconnect: ReconnectConfig,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(15),
            channel_capacity: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// A CDP client connected to Chrome over WebSocket.
///
/// This is the main entry point for sending CDP commands and subscribing
/// to events. It communicates with a background transport task that owns
/// the WebSocket connection.
#[derive(Debug)]
pub struct CdpClient {
    handle: TransportHandle,
    config: CdpConfig,
    url: String,
    contexts: Arc<Mutex<ContextRegistry>>,
}

impl CdpClient {
    /// Connect to a CDP WebSocket endpoint by URL.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Connection` if the WebSocket handshake fails,
    /// or `CdpError::ConnectionTimeout` if the connection attempt exceeds
    /// the configured timeout.
    pub async fn connect(url: &str, config: CdpConfig) -> Result<Self, CdpError> {
        let handle = spawn_transport(
            url,
            config.channel_capacity,
            config.reconnect.clone(),
            config.connect_timeout,
        )
        .await?;

        let client = Self {
            handle,
            config,
            url: url.to_owned(),
            contexts: Arc::new(Mutex::new(ContextRegistry::new())),
        };
        client.enable_runtime_and_track_contexts().await?;
        client.spawn_reconnect_watcher();
        Ok(client)
    }

    /// Watch for `LifecycleEvent::Reconnected` and redo the setup `connect`
    /// does once up front: clear stale contexts (they belonged to the old
    /// session) and resend `Runtime.enable` (domains don't survive a new
    /// WebSocket session). Event subscriptions and the context tracker task
    /// stay alive across a reconnect, so only the domain itself needs redoing.
    fn spawn_reconnect_watcher(&self) {
        let mut lifecycle_rx = self.subscribe_lifecycle();
        let handle = self.handle.clone();
        let command_timeout = self.config.command_timeout;
        let contexts = Arc::clone(&self.contexts);
        tokio::spawn(async move {
            loop {
                match lifecycle_rx.recv().await {
                    Ok(LifecycleEvent::Reconnected) => {
                        contexts
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner)
                            .cleared();
                        if let Err(e) =
                            send_command_impl(&handle, command_timeout, "Runtime.enable", None, None).await
                        {
                            tracing::warn!(error = %e, "failed to re-enable Runtime domain after reconnect");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Discover a target on the given ports, matching `workspace_hint` against
    /// target title/url, and connect to it.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Connection` if no port yields a usable target or the
    /// WebSocket handshake fails, `CdpError::InvalidResponse` if every port
    /// answers but none has a matching page target.
    pub async fn connect_discovered(
        ports: &[u16],
        workspace_hint: Option<&str>,
        config: CdpConfig,
    ) -> Result<Self, CdpError> {
        let found = discover(ports, workspace_hint).await?;
        let ws_url = found.target.ws_debugger_url.ok_or_else(|| {
            CdpError::InvalidResponse("selected target has no webSocketDebuggerUrl".into())
        })?;
        Self::connect(&ws_url, config).await
    }

    /// Enable the `Runtime` domain and start the execution-context tracker.
    async fn enable_runtime_and_track_contexts(&self) -> Result<(), CdpError> {
        self.send_command("Runtime.enable", None).await?;

        let created_rx = self.subscribe("Runtime.executionContextCreated").await?;
        let destroyed_rx = self.subscribe("Runtime.executionContextDestroyed").await?;
        let cleared_rx = self.subscribe("Runtime.executionContextsCleared").await?;
        let (changed_tx, mut changed_rx) = mpsc::channel(self.config.channel_capacity);

        spawn_context_tracker(
            Arc::clone(&self.contexts),
            created_rx,
            destroyed_rx,
            cleared_rx,
            changed_tx,
        );

        let lifecycle_tx = self.handle.lifecycle_sender();
        tokio::spawn(async move {
            while changed_rx.recv().await.is_some() {
                let _ = lifecycle_tx.send(LifecycleEvent::ContextsChanged);
            }
        });

        Ok(())
    }

    /// Read the currently selected primary execution context, if any.
    #[must_use]
    pub fn primary_context_id(&self) -> Option<i64> {
        self.contexts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .primary_context_id()
    }

    /// Poll the context registry until a primary context appears or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.primary_context_id().is_some() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Subscribe to connection-lifecycle events (`disconnected`, `reconnecting`, …).
    #[must_use]
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.handle.subscribe_lifecycle()
    }

    /// Evaluate `expression` in the primary execution context and return its
    /// value by-value.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::InvalidResponse` if no primary context has been
    /// selected yet, or any error `Runtime.evaluate` itself reports
    /// (including a thrown JS exception, surfaced as `CdpError::Protocol`).
    pub async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, CdpError> {
        self.evaluate_inner(expression, false).await
    }

    /// Like [`Self::evaluate`], but awaits the expression's result as a
    /// promise (used for `navigator.clipboard.readText()`).
    ///
    /// # Errors
    ///
    /// Same as [`Self::evaluate`].
    pub async fn evaluate_await_promise(
        &self,
        expression: &str,
    ) -> Result<serde_json::Value, CdpError> {
        self.evaluate_inner(expression, true).await
    }

    async fn evaluate_inner(
        &self,
        expression: &str,
        await_promise: bool,
    ) -> Result<serde_json::Value, CdpError> {
        let context_id = self.primary_context_id().ok_or_else(|| {
            CdpError::InvalidResponse("no primary execution context selected".into())
        })?;
        let params = serde_json::json!({
            "expression": expression,
            "contextId": context_id,
            "returnByValue": true,
            "awaitPromise": await_promise,
        });
        let result = self.send_command("Runtime.evaluate", Some(params)).await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .unwrap_or("JS exception during Runtime.evaluate")
                .to_owned();
            return Err(CdpError::Protocol {
                code: -1,
                message: text,
            });
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    /// Send a CDP command (browser-level, no session).
    ///
    /// # Errors
    ///
    /// Returns `CdpError::CommandTimeout` if Chrome does not respond within
    /// the configured timeout, `CdpError::Protocol` if Chrome returns an
    /// error, or `CdpError::Internal` if the transport task has exited.
    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        send_command_impl(&self.handle, self.config.command_timeout, method, params, None).await
    }

    /// Subscribe to CDP events matching a method name.
    ///
    /// Returns a receiver that yields `CdpEvent` values. Events stop
    /// being delivered when the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn subscribe(
        &self,
        method: &str,
    ) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
        subscribe_impl(&self.handle, self.config.channel_capacity, method, None).await
    }

    /// Create a CDP session attached to a specific target.
    ///
    /// Sends `Target.attachToTarget` and returns a `CdpSession` bound
    /// to the returned session ID.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Protocol` if the target cannot be attached,
    /// or any transport error.
    pub async fn create_session(&self, target_id: &str) -> Result<CdpSession, CdpError> {
        let params = serde_json::json!({
            "targetId": target_id,
            "flatten": true,
        });
        let result = self
            .send_command("Target.attachToTarget", Some(params))
            .await?;
        let session_id = result["sessionId"]
            .as_str()
            .ok_or_else(|| {
                CdpError::InvalidResponse(
                    "Target.attachToTarget response missing sessionId".into(),
                )
            })?
            .to_owned();

        Ok(CdpSession {
            session_id,
            handle: self.handle.clone(),
            config: self.config.clone(),
        })
    }

    /// Gracefully close the WebSocket connection.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has already exited.
    pub async fn close(self) -> Result<(), CdpError> {
        self.handle.send(TransportCommand::Shutdown).await
    }

    /// Check if the client is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    /// Get the WebSocket URL this client is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// A CDP session bound to a specific target (tab).
///
/// Sessions share the parent client's WebSocket connection but route
/// commands and events through a `sessionId`.
#[derive(Debug)]
pub struct CdpSession {
    session_id: String,
    handle: TransportHandle,
    config: CdpConfig,
}

impl CdpSession {
    /// Send a command within this session's context.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`CdpClient::send_command`].
    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, CdpError> {
        send_command_impl(
            &self.handle,
            self.config.command_timeout,
            method,
            params,
            Some(self.session_id.clone()),
        )
        .await
    }

    /// Subscribe to events within this session.
    ///
    /// # Errors
    ///
    /// Returns `CdpError::Internal` if the transport task has exited.
    pub async fn subscribe(
        &self,
        method: &str,
    ) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
        subscribe_impl(
            &self.handle,
            self.config.channel_capacity,
            method,
            Some(self.session_id.clone()),
        )
        .await
    }

    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Send a CDP command via the transport handle and await the response.
async fn send_command_impl(
    handle: &TransportHandle,
    command_timeout: Duration,
    method: &str,
    params: Option<serde_json::Value>,
    session_id: Option<String>,
) -> Result<serde_json::Value, CdpError> {
    let id = handle.next_message_id();
    let command = super::types::CdpCommand {
        id,
        method: method.to_owned(),
        params,
        session_id,
    };

    let (response_tx, response_rx) = oneshot::channel();
    let deadline = Instant::now() + command_timeout;

    handle
        .send(TransportCommand::SendCommand {
            command,
            response_tx,
            deadline,
        })
        .await?;

    response_rx
        .await
        .map_err(|_| CdpError::Internal("transport task exited before responding".into()))?
}

/// Register an event subscription via the transport handle.
async fn subscribe_impl(
    handle: &TransportHandle,
    channel_capacity: usize,
    method: &str,
    session_id: Option<String>,
) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
    let (event_tx, event_rx) = mpsc::channel(channel_capacity);
    handle
        .send(TransportCommand::Subscribe {
            method: method.to_owned(),
            session_id,
            event_tx,
        })
        .await?;
    Ok(event_rx)
}
