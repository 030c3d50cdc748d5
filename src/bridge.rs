//! `SessionBridge`: the unit of serialization for one channel/session. Owns
//! at most one active `ResponseMonitor` and one set of detectors bound to
//! one `CdpClient`, and routes between chat-side events and CDP-side
//! effects.

use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::capability::{ChatTransport, UiEventDescriptor};
use crate::cdp::CdpClient;
use crate::config::{ResolvedActivation, ResolvedDetect, ResolvedMonitor, ResolvedSink};
use crate::detect::{ApprovalDetector, ErrorPopupDetector, PlanningDetector, UserMessageDetector};
use crate::error::{BridgeFailure, FailureKind};
use crate::model::EchoTable;
use crate::monitor::{CdpDomProbe, MonitorCallbacks, MonitorConfig, ResponseMonitor, StartMode};
use crate::sink::{ProgressSink, SinkConfig};

/// An uploaded attachment, staged locally before `DOM.setFileInputFiles`
/// points the assistant's file input at it.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub local_path: String,
}

/// Per-session state mutated only under the bridge's single-writer lock.
struct SessionState {
    monitor: Option<ResponseMonitor>,
    session_title: String,
}

/// Runtime knobs a `SessionBridge` needs from the resolved config, trimmed
/// to just the fields this module consumes.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub monitor: ResolvedMonitor,
    pub detect: ResolvedDetect,
    pub sink: ResolvedSink,
    pub activation: ResolvedActivation,
}

impl From<&crate::config::ResolvedConfig> for BridgeConfig {
    fn from(c: &crate::config::ResolvedConfig) -> Self {
        Self {
            monitor: c.monitor.clone(),
            detect: c.detect.clone(),
            sink: c.sink.clone(),
            activation: c.activation.clone(),
        }
    }
}

/// The unit of serialization for one channel/session.
///
/// Operations that mutate session state (activate, inject, start monitor)
/// execute under `state`'s lock; probes and detector callbacks never mutate
/// session state directly — they enqueue onto this serialized path via
/// `tokio::spawn`.
pub struct SessionBridge<T: ChatTransport> {
    client: Arc<CdpClient>,
    transport: Arc<T>,
    channel_id: String,
    config: BridgeConfig,
    echo_table: Arc<Mutex<EchoTable>>,
    state: AsyncMutex<SessionState>,
    approval: ApprovalDetector,
    planning: PlanningDetector,
    error_popup: ErrorPopupDetector,
    user_message: UserMessageDetector,
}

impl<T: ChatTransport + 'static> SessionBridge<T> {
    pub fn new(
        client: Arc<CdpClient>,
        transport: Arc<T>,
        channel_id: String,
        session_title: String,
        config: BridgeConfig,
    ) -> Arc<Self> {
        let echo_table = Arc::new(Mutex::new(EchoTable::new()));

        let approval_transport = Arc::clone(&transport);
        let approval_channel = channel_id.clone();
        let approval = ApprovalDetector::start(
            Arc::clone(&client),
            std::time::Duration::from_millis(config.detect.approval_poll_ms),
            move |signal| {
                let transport = Arc::clone(&approval_transport);
                let channel = approval_channel.clone();
                tokio::spawn(async move {
                    let _ = transport
                        .send_rich(
                            &channel,
                            UiEventDescriptor::Approval {
                                title: "Approval requested".into(),
                                body: signal.description,
                                approve_label: signal.button_text,
                                deny_label: "Deny".into(),
                            },
                        )
                        .await;
                });
            },
        );

        let planning_transport = Arc::clone(&transport);
        let planning_channel = channel_id.clone();
        let planning = PlanningDetector::start(
            Arc::clone(&client),
            std::time::Duration::from_millis(config.detect.planning_poll_ms),
            move |signal| {
                let transport = Arc::clone(&planning_transport);
                let channel = planning_channel.clone();
                tokio::spawn(async move {
                    let _ = transport
                        .send_rich(
                            &channel,
                            UiEventDescriptor::Planning {
                                title: signal.button_text,
                                body: signal.description,
                            },
                        )
                        .await;
                });
            },
        );

        let error_transport = Arc::clone(&transport);
        let error_channel = channel_id.clone();
        let error_popup = ErrorPopupDetector::start(
            Arc::clone(&client),
            std::time::Duration::from_millis(config.detect.error_popup_poll_ms),
            move |signal| {
                let transport = Arc::clone(&error_transport);
                let channel = error_channel.clone();
                tokio::spawn(async move {
                    let _ = transport
                        .send_rich(
                            &channel,
                            UiEventDescriptor::ErrorPopup {
                                title: signal.title,
                                body: signal.body,
                            },
                        )
                        .await;
                });
            },
        );

        let user_message_transport = Arc::clone(&transport);
        let user_message_channel = channel_id.clone();
        let user_message = UserMessageDetector::start(
            Arc::clone(&client),
            Arc::clone(&echo_table),
            std::time::Duration::from_millis(config.detect.user_message_poll_ms),
            move |text| {
                let transport = Arc::clone(&user_message_transport);
                let channel = user_message_channel.clone();
                tokio::spawn(async move {
                    let _ = transport.send_message(&channel, &text).await;
                });
            },
        );

        Arc::new(Self {
            client,
            transport,
            channel_id,
            config,
            echo_table,
            state: AsyncMutex::new(SessionState {
                monitor: None,
                session_title,
            }),
            approval,
            planning,
            error_popup,
            user_message,
        })
    }

    /// Submit a prompt for this session. Rejects with `Busy` if one is
    /// already generating.
    ///
    /// # Errors
    ///
    /// Returns `BridgeFailure` with kind `Busy` if a prompt is already in
    /// flight, `ActivationFailed` if the session could not be re-entered,
    /// or a CDP-derived failure for injection/upload errors.
    pub async fn submit_prompt(
        self: &Arc<Self>,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<(), BridgeFailure> {
        let mut state = self.state.lock().await;
        if state.monitor.is_some() {
            return Err(BridgeFailure::new(
                FailureKind::Busy,
                "a prompt is already generating for this session",
            ));
        }

        self.echo_table
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .record(text);

        self.activate_session(&state.session_title).await?;

        for attachment in attachments {
            self.upload_attachment(attachment).await?;
        }

        let script = crate::scripts::inject_message_script(text);
        self.client
            .evaluate(&script)
            .await
            .map_err(BridgeFailure::from)?;

        let monitor = self.start_monitor();
        state.monitor = Some(monitor);
        Ok(())
    }

    /// Stop the in-flight generation, if any, via the monitor's stop-button
    /// click.
    ///
    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn stop(self: &Arc<Self>) -> Result<(), BridgeFailure> {
        let state = self.state.lock().await;
        if let Some(monitor) = &state.monitor {
            monitor.click_stop().await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn approval_detector(&self) -> &ApprovalDetector {
        &self.approval
    }

    #[must_use]
    pub fn planning_detector(&self) -> &PlanningDetector {
        &self.planning
    }

    #[must_use]
    pub fn error_popup_detector(&self) -> &ErrorPopupDetector {
        &self.error_popup
    }

    pub async fn shutdown(&self) {
        self.approval.stop().await;
        self.planning.stop().await;
        self.error_popup.stop().await;
        self.user_message.stop().await;
        if let Some(monitor) = self.state.lock().await.monitor.take() {
            monitor.stop().await;
        }
    }

    /// Try direct side-panel activation first, then the "Past Conversations"
    /// flow, retrying both until the UI stabilizes or the configured
    /// activation budget elapses.
    async fn activate_session(&self, title: &str) -> Result<(), BridgeFailure> {
        let deadline = std::time::Instant::now()
            + std::time::Duration::from_millis(self.config.activation.max_duration_ms);
        let retry_interval =
            std::time::Duration::from_millis(self.config.activation.retry_interval_ms);

        loop {
            let direct = self
                .client
                .evaluate(&crate::scripts::click_by_text(title))
                .await
                .map_err(BridgeFailure::from)?;
            if direct.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
                return Ok(());
            }

            self.client
                .evaluate(crate::scripts::OPEN_PAST_CONVERSATIONS)
                .await
                .map_err(BridgeFailure::from)?;

            let via_history = self
                .client
                .evaluate(&crate::scripts::click_by_text(title))
                .await
                .map_err(BridgeFailure::from)?;
            if via_history.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
                return Ok(());
            }

            if std::time::Instant::now() >= deadline {
                return Err(BridgeFailure::new(
                    FailureKind::ActivationFailed,
                    format!("could not activate session \"{title}\""),
                )
                .with_remediation("re-open the assistant UI manually and retry"));
            }
            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Point the assistant's file input at `attachment` via
    /// `DOM.setFileInputFiles`. Synthetic `input`/`change` events are fired
    /// internally by Chrome, not by this crate.
    async fn upload_attachment(&self, attachment: &Attachment) -> Result<(), BridgeFailure> {
        let document = self
            .client
            .send_command("DOM.getDocument", None)
            .await
            .map_err(BridgeFailure::from)?;
        let root_node_id = document
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .cloned()
            .ok_or_else(|| {
                BridgeFailure::new(FailureKind::InvalidPayload, "DOM.getDocument missing root nodeId")
            })?;
        let query = self
            .client
            .send_command(
                "DOM.querySelector",
                Some(serde_json::json!({
                    "nodeId": root_node_id,
                    "selector": "input[type=\"file\"]",
                })),
            )
            .await
            .map_err(BridgeFailure::from)?;
        let node_id = query.get("nodeId").cloned().ok_or_else(|| {
            BridgeFailure::new(FailureKind::InvalidPayload, "no file input found in assistant UI")
        })?;
        self.client
            .send_command(
                "DOM.setFileInputFiles",
                Some(serde_json::json!({
                    "nodeId": node_id,
                    "files": [attachment.local_path],
                })),
            )
            .await
            .map_err(BridgeFailure::from)?;
        Ok(())
    }

    fn start_monitor(self: &Arc<Self>) -> ResponseMonitor {
        let probe = Arc::new(CdpDomProbe::new(Arc::clone(&self.client)));
        let lifecycle = self.client.subscribe_lifecycle();

        let sink = Arc::new(AsyncMutex::new(ProgressSink::new(
            Arc::clone(&self.transport),
            self.channel_id.clone(),
            SinkConfig {
                throttle: std::time::Duration::from_millis(self.config.sink.throttle_ms),
                max_message_len: self.config.sink.max_message_len,
                wrap_code_block: self.config.sink.wrap_code_block,
            },
        )));

        let progress_sink = Arc::clone(&sink);
        let on_progress = Box::new(move |text: String| {
            let sink = Arc::clone(&progress_sink);
            tokio::spawn(async move {
                let _ = sink.lock().await.append(text).await;
            });
        });

        let phase_transport = Arc::clone(&self.transport);
        let phase_channel = self.channel_id.clone();
        let on_phase_change = Box::new(move |phase: crate::model::PhaseState, _text: Option<String>| {
            let label = match phase {
                crate::model::PhaseState::Thinking => Some("_thinking…_"),
                crate::model::PhaseState::Generating => Some("_generating…_"),
                _ => None,
            };
            if let Some(label) = label {
                let transport = Arc::clone(&phase_transport);
                let channel = phase_channel.clone();
                tokio::spawn(async move {
                    let _ = transport.send_message(&channel, label).await;
                });
            }
        });

        let complete_sink = Arc::clone(&sink);
        let bridge_for_complete = Arc::clone(self);
        let on_complete = Box::new(move |text: String| {
            let sink = Arc::clone(&complete_sink);
            let bridge = Arc::clone(&bridge_for_complete);
            tokio::spawn(async move {
                let _ = sink.lock().await.force_emit().await;
                bridge.state.lock().await.monitor = None;
            });
            let _ = text;
        });

        let log_transport = Arc::clone(&self.transport);
        let log_channel = self.channel_id.clone();
        let on_process_log = Box::new(move |joined: String| {
            let transport = Arc::clone(&log_transport);
            let channel = log_channel.clone();
            tokio::spawn(async move {
                let _ = transport.send_message(&channel, &joined).await;
            });
        });

        let timeout_sink = Arc::clone(&sink);
        let bridge_for_timeout = Arc::clone(self);
        let on_timeout = Box::new(move |_last_text: Option<String>| {
            let sink = Arc::clone(&timeout_sink);
            let bridge = Arc::clone(&bridge_for_timeout);
            tokio::spawn(async move {
                let _ = sink.lock().await.force_emit().await;
                bridge.state.lock().await.monitor = None;
            });
        });

        ResponseMonitor::start(
            StartMode::Active,
            probe,
            lifecycle,
            MonitorCallbacks {
                on_progress,
                on_phase_change,
                on_process_log,
                on_complete,
                on_timeout,
            },
            MonitorConfig {
                poll_interval: std::time::Duration::from_millis(self.config.monitor.poll_interval_ms),
                stop_gone_confirm_count: self.config.monitor.stop_gone_confirm_count,
                max_duration: std::time::Duration::from_millis(self.config.monitor.max_duration_ms),
                seen_log_capacity: self.config.monitor.seen_log_capacity,
            },
        )
    }
}
