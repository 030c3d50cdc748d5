//! The Detector family: long-lived pollers that deduplicate transient DOM
//! events into monotonic callback streams.
//!
//! Control flow: `CdpClient (poll) → Detector → SessionBridge → ChatTransport`.

pub mod approval;
pub mod error_popup;
pub mod planning;
pub mod poller;
pub mod user_message;

pub use approval::{ApprovalDetector, ApprovalSignal};
pub use error_popup::{ErrorPopupDetector, ErrorPopupSignal};
pub use planning::{PlanningDetector, PlanningSignal};
pub use user_message::UserMessageDetector;

/// Result of a click action exposed by a detector (`ClickDismiss`,
/// `ApproveButton`, …), mirroring the shape `scripts::click_by_text`
/// returns from the DOM.
#[derive(Debug, Clone)]
pub struct ClickResult {
    pub ok: bool,
    pub method: Option<String>,
    pub err: Option<String>,
}

impl ClickResult {
    #[must_use]
    pub fn from_script_value(value: &serde_json::Value) -> Self {
        let ok = value.get("ok").and_then(serde_json::Value::as_bool).unwrap_or(false);
        Self {
            ok,
            method: value
                .get("method")
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned),
            err: value
                .get("err")
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned),
        }
    }
}
