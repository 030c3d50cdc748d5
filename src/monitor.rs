//! `ResponseMonitor`: a polling state machine that drives one in-progress
//! assistant reply from `waiting` through to a terminal phase.
//!
//! Owns its state in a dedicated task, driven by `tokio::spawn` + `mpsc`/
//! `oneshot` for commands and `tokio::select!` for cancellation, with
//! results delivered back through caller-supplied callbacks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::cdp::LifecycleEvent;
use crate::error::{BridgeFailure, FailureKind};
use crate::model::{MonitorCursor, PhaseState};

/// The four DOM evaluations a poll cycle issues, in order. A real
/// implementation evaluates the scripts in `crate::scripts` over a CDP
/// session; tests drive a scripted fake directly, matching the "scriptable
/// fake DomExtractor/probe sequence" test harness this crate standardizes
/// on.
#[async_trait]
pub trait DomProbe: Send + Sync {
    async fn stop_button(&self) -> Result<bool, BridgeFailure>;
    async fn quota(&self) -> Result<bool, BridgeFailure>;
    /// `None` means extraction failed or returned nothing usable — the
    /// monitor treats this as "no change this cycle", not an error.
    async fn text(&self) -> Result<Option<String>, BridgeFailure>;
    /// Only consulted when `text()` did not itself carry activity lines
    /// (i.e. legacy mode, or structured mode with no non-assistant-body
    /// segments).
    async fn process_log(&self) -> Result<Vec<String>, BridgeFailure>;
}

/// Real `DomProbe` backed by a CDP client, evaluating `crate::scripts`
/// against the assistant's primary execution context.
pub struct CdpDomProbe {
    client: Arc<crate::cdp::CdpClient>,
}

impl CdpDomProbe {
    #[must_use]
    pub fn new(client: Arc<crate::cdp::CdpClient>) -> Self {
        Self { client }
    }

    /// Structured extraction, falling back to the legacy scored-selector
    /// walk when no structured segments are present. Returns the joined
    /// assistant-body text plus any activity lines the structured payload
    /// itself carried (tool-call/tool-result/thinking segments).
    async fn extract_text(&self) -> Result<(Option<String>, Vec<String>), BridgeFailure> {
        let structured = self.client.evaluate(crate::scripts::STRUCTURED_TEXT_PROBE).await?;
        if let Some(segments) = structured.get("segments").and_then(|s| s.as_array()) {
            if !segments.is_empty() {
                let mut body = String::new();
                let mut activity = Vec::new();
                for segment in segments {
                    let kind = segment.get("kind").and_then(serde_json::Value::as_str).unwrap_or_default();
                    let text = segment.get("text").and_then(serde_json::Value::as_str).unwrap_or_default();
                    match kind {
                        "assistant-body" => body.push_str(text),
                        "feedback" => {}
                        _ => activity.push(text.to_owned()),
                    }
                }
                return Ok((if body.is_empty() { None } else { Some(body) }, activity));
            }
        }

        let legacy = self.client.evaluate(crate::scripts::LEGACY_TEXT_PROBE).await?;
        let text = legacy.as_str().filter(|s| !s.is_empty()).map(ToOwned::to_owned);
        Ok((text, Vec::new()))
    }
}

#[async_trait]
impl DomProbe for CdpDomProbe {
    async fn stop_button(&self) -> Result<bool, BridgeFailure> {
        let value = self.client.evaluate(crate::scripts::STOP_BUTTON_PROBE).await?;
        let parsed: serde_json::Value = match value.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| BridgeFailure::new(FailureKind::InvalidPayload, e.to_string()))?,
            None => value,
        };
        Ok(parsed
            .get("isGenerating")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    async fn quota(&self) -> Result<bool, BridgeFailure> {
        let value = self.client.evaluate(crate::scripts::QUOTA_PROBE).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text(&self) -> Result<Option<String>, BridgeFailure> {
        let (text, _) = self.extract_text().await?;
        Ok(text)
    }

    async fn process_log(&self) -> Result<Vec<String>, BridgeFailure> {
        let (_, activity) = self.extract_text().await?;
        if !activity.is_empty() {
            return Ok(activity);
        }
        let value = self.client.evaluate(crate::scripts::PROCESS_LOG_PROBE).await?;
        let parsed: serde_json::Value = match value.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| BridgeFailure::new(FailureKind::InvalidPayload, e.to_string()))?,
            None => value,
        };
        Ok(parsed
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// How a monitor was started: fresh generation vs. rejoining one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Clean start: captures baseline text/process-log keys.
    Active,
    /// Rejoining a session whose generation may already be in flight.
    Passive,
}

/// Tunables for the poll loop, resolved from `[monitor]` config.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub stop_gone_confirm_count: u32,
    pub max_duration: Duration,
    pub seen_log_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            stop_gone_confirm_count: 3,
            max_duration: Duration::from_secs(120),
            seen_log_capacity: 200,
        }
    }
}

/// Callbacks as a record of functions, invoked synchronously from the poll
/// task; callers that need to do async work (posting to chat) queue it onto
/// their own channel from inside the closure.
pub struct MonitorCallbacks {
    pub on_progress: Box<dyn Fn(String) + Send + Sync>,
    pub on_phase_change: Box<dyn Fn(PhaseState, Option<String>) + Send + Sync>,
    pub on_process_log: Box<dyn Fn(String) + Send + Sync>,
    pub on_complete: Box<dyn Fn(String) + Send + Sync>,
    pub on_timeout: Box<dyn Fn(Option<String>) + Send + Sync>,
}

/// Result of `ClickStop`.
#[derive(Debug, Clone)]
pub struct ClickStopResult {
    pub ok: bool,
    pub method: Option<String>,
    pub err: Option<String>,
}

enum MonitorCommand {
    Stop,
    ClickStop(oneshot::Sender<ClickStopResult>),
}

#[derive(Debug)]
struct SharedState {
    phase: PhaseState,
    last_text: Option<String>,
    quota_detected: bool,
}

/// Handle to a running monitor task. `Stop` is idempotent; dropping the
/// handle without calling `stop` leaves the task running (it only stops on
/// an explicit `Stop` or a terminal phase).
pub struct ResponseMonitor {
    shared: Arc<Mutex<SharedState>>,
    command_tx: mpsc::Sender<MonitorCommand>,
    stopped: std::sync::atomic::AtomicBool,
}

impl ResponseMonitor {
    /// Start a monitor. Spawns the poll task and returns immediately.
    pub fn start(
        mode: StartMode,
        probe: Arc<dyn DomProbe>,
        lifecycle: broadcast::Receiver<LifecycleEvent>,
        callbacks: MonitorCallbacks,
        config: MonitorConfig,
    ) -> Self {
        let initial_phase = match mode {
            StartMode::Active => PhaseState::Waiting,
            StartMode::Passive => PhaseState::Generating,
        };
        let shared = Arc::new(Mutex::new(SharedState {
            phase: initial_phase,
            last_text: None,
            quota_detected: false,
        }));
        let (command_tx, command_rx) = mpsc::channel(16);

        let task_shared = Arc::clone(&shared);
        tokio::spawn(run_poll_loop(
            mode,
            probe,
            lifecycle,
            callbacks,
            config,
            task_shared,
            command_rx,
        ));

        Self {
            shared,
            command_tx,
            stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Idempotent.
    pub async fn stop(&self) {
        if self
            .stopped
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return;
        }
        let _ = self.command_tx.send(MonitorCommand::Stop).await;
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the monitor task has already exited.
    pub async fn click_stop(&self) -> Result<ClickStopResult, BridgeFailure> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(MonitorCommand::ClickStop(tx))
            .await
            .map_err(|_| BridgeFailure::new(FailureKind::Disconnected, "monitor task exited"))?;
        rx.await
            .map_err(|_| BridgeFailure::new(FailureKind::Disconnected, "monitor task exited"))
    }

    #[must_use]
    pub fn phase(&self) -> PhaseState {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .phase
    }

    #[must_use]
    pub fn last_text(&self) -> Option<String> {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .last_text
            .clone()
    }

    #[must_use]
    pub fn quota_detected(&self) -> bool {
        self.shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .quota_detected
    }
}

fn set_phase(
    shared: &Mutex<SharedState>,
    callbacks: &MonitorCallbacks,
    phase: PhaseState,
    text: Option<String>,
) {
    {
        let mut guard = shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.phase = phase;
        if let Some(t) = &text {
            guard.last_text = Some(t.clone());
        }
    }
    tracing::info!(?phase, "monitor phase change");
    (callbacks.on_phase_change)(phase, text);
}

/// True if `text` should be treated as genuinely new: not identical to the
/// captured baseline while nothing has been emitted yet (suppressed as
/// pre-existing text), and not identical to what was last actually emitted
/// (avoids re-emitting unchanged text).
fn is_new_text(cursor: &MonitorCursor, text: &str) -> bool {
    if cursor.last_emitted_text.is_none() && cursor.baseline_text.as_deref() == Some(text) {
        return false;
    }
    if cursor.last_emitted_text.as_deref() == Some(text) {
        return false;
    }
    true
}

#[allow(clippy::too_many_lines)]
async fn run_poll_loop(
    mode: StartMode,
    probe: Arc<dyn DomProbe>,
    mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    callbacks: MonitorCallbacks,
    config: MonitorConfig,
    shared: Arc<Mutex<SharedState>>,
    mut command_rx: mpsc::Receiver<MonitorCommand>,
) {
    let mut cursor = MonitorCursor::new(config.seen_log_capacity);
    if mode == StartMode::Passive {
        cursor.generation_started = true;
    }
    let mut paused = false;
    let mut phase_before_disconnect = PhaseState::Waiting;
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if paused {
                    continue;
                }
                if poll_cycle(&probe, &callbacks, &config, &shared, &mut cursor).await {
                    break;
                }
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(MonitorCommand::Stop) | None => {
                        tracing::info!("monitor stopped");
                        break;
                    }
                    Some(MonitorCommand::ClickStop(tx)) => {
                        let result = match probe.stop_button().await {
                            Ok(true) => ClickStopResult { ok: true, method: Some("click".into()), err: None },
                            Ok(false) => ClickStopResult { ok: false, method: None, err: Some("no generation in progress".into()) },
                            Err(e) => ClickStopResult { ok: false, method: None, err: Some(e.to_string()) },
                        };
                        let _ = tx.send(result);
                    }
                }
            }
            Ok(event) = lifecycle.recv() => {
                let current_phase = shared.lock().unwrap_or_else(std::sync::PoisonError::into_inner).phase;
                if current_phase.is_terminal() {
                    continue;
                }
                match event {
                    LifecycleEvent::Disconnected => {
                        if current_phase != PhaseState::Disconnected {
                            phase_before_disconnect = current_phase;
                            paused = true;
                            set_phase(&shared, &callbacks, PhaseState::Disconnected, None);
                        }
                    }
                    LifecycleEvent::Reconnected => {
                        if current_phase == PhaseState::Disconnected {
                            paused = false;
                            set_phase(&shared, &callbacks, phase_before_disconnect, None);
                        }
                    }
                    LifecycleEvent::ReconnectFailed { .. } => {
                        if current_phase == PhaseState::Disconnected {
                            set_phase(&shared, &callbacks, PhaseState::Timeout, None);
                            let last_text = cursor.last_emitted_text.clone();
                            tracing::warn!("monitor timed out after reconnect failure");
                            (callbacks.on_timeout)(last_text);
                            break;
                        }
                    }
                    LifecycleEvent::Reconnecting { .. } | LifecycleEvent::ContextsChanged => {}
                }
            }
        }
    }
}

/// Run one poll cycle. Returns `true` if the monitor reached a terminal
/// phase and the loop should stop.
async fn poll_cycle(
    probe: &Arc<dyn DomProbe>,
    callbacks: &MonitorCallbacks,
    config: &MonitorConfig,
    shared: &Arc<Mutex<SharedState>>,
    cursor: &mut MonitorCursor,
) -> bool {
    tracing::debug!("monitor poll cycle");

    let stop_generating = probe.stop_button().await.unwrap_or(false);
    let quota = probe.quota().await.unwrap_or(false);
    let text = probe.text().await.unwrap_or(None);

    let phase = shared
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .phase;

    if let Some(t) = &text {
        if cursor.baseline_text.is_none() {
            cursor.baseline_text = Some(t.clone());
            cursor.last_observed_text = Some(t.clone());
        } else if cursor.last_observed_text.as_deref() != Some(t.as_str()) {
            cursor.last_observed_text = Some(t.clone());
            cursor.note_text_change();
        }
    }

    let mut phase = phase;

    if phase == PhaseState::Waiting && stop_generating {
        phase = PhaseState::Thinking;
        set_phase(shared, callbacks, phase, None);
    }

    if matches!(phase, PhaseState::Waiting | PhaseState::Thinking) {
        if let Some(t) = &text {
            if is_new_text(cursor, t) {
                phase = PhaseState::Generating;
                cursor.generation_started = true;
                set_phase(shared, callbacks, phase, Some(t.clone()));
                cursor.last_emitted_text = Some(t.clone());
                (callbacks.on_progress)(t.clone());
            }
        }
    } else if phase == PhaseState::Generating {
        if let Some(t) = &text {
            if is_new_text(cursor, t) {
                cursor.last_emitted_text = Some(t.clone());
                (callbacks.on_progress)(t.clone());
            }
        }

        emit_process_log(probe, callbacks, cursor).await;

        if stop_generating {
            cursor.stop_gone_count = 0;
        } else {
            cursor.stop_gone_count += 1;
        }
    }

    // Quota handling applies to any non-terminal phase.
    if quota {
        shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .quota_detected = true;
        if cursor.last_emitted_text.is_none() {
            set_phase(shared, callbacks, PhaseState::QuotaReached, None);
            tracing::info!("quota reached with no text streamed");
            (callbacks.on_complete)(String::new());
            return true;
        }
        cursor.quota_detected = true;
    }

    if phase == PhaseState::Generating
        && cursor.stop_gone_count >= config.stop_gone_confirm_count
    {
        let final_text = cursor.last_emitted_text.clone().unwrap_or_default();
        set_phase(shared, callbacks, PhaseState::Complete, None);
        tracing::info!("monitor complete");
        (callbacks.on_complete)(final_text);
        return true;
    }

    if cursor.last_text_change_at.elapsed() >= config.max_duration {
        set_phase(shared, callbacks, PhaseState::Timeout, None);
        tracing::warn!("monitor timed out on inactivity");
        (callbacks.on_timeout)(cursor.last_emitted_text.clone());
        return true;
    }

    false
}

/// Emit unseen process-log entries, if any. Returns whether anything was
/// emitted (informational only — process-log emission never affects phase).
async fn emit_process_log(
    probe: &Arc<dyn DomProbe>,
    callbacks: &MonitorCallbacks,
    cursor: &mut MonitorCursor,
) -> bool {
    let Ok(entries) = probe.process_log().await else {
        return false;
    };
    let fresh: Vec<String> = entries
        .into_iter()
        .filter(|e| cursor.note_log_entry(e))
        .collect();
    if fresh.is_empty() {
        return false;
    }
    (callbacks.on_process_log)(fresh.join("\n\n"));
    true
}
