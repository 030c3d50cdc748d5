//! `ApprovalDetector`: fires when an approval-request card appears in the
//! assistant UI, deduplicated by `buttonText::description`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cdp::CdpClient;
use crate::error::BridgeFailure;
use crate::scripts;

use super::ClickResult;
use super::poller::{Poller, Probe};

#[derive(Debug, Clone)]
pub struct ApprovalSignal {
    pub button_text: String,
    pub description: String,
}

struct ApprovalProbe {
    client: Arc<CdpClient>,
}

#[async_trait]
impl Probe for ApprovalProbe {
    type Signal = ApprovalSignal;

    async fn poll(&self) -> Result<Option<(String, Self::Signal)>, BridgeFailure> {
        let value = self.client.evaluate(scripts::APPROVAL_PROBE).await?;
        if value.is_null() {
            return Ok(None);
        }
        let parsed: serde_json::Value = match value.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| BridgeFailure::new(crate::error::FailureKind::InvalidPayload, e.to_string()))?,
            None => value,
        };
        let button_text = parsed
            .get("buttonText")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Allow")
            .to_owned();
        let description = parsed
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let key = format!("{button_text}::{description}");
        Ok(Some((
            key,
            ApprovalSignal {
                button_text,
                description,
            },
        )))
    }
}

pub struct ApprovalDetector {
    client: Arc<CdpClient>,
    poller: Poller,
}

impl ApprovalDetector {
    pub fn start<F>(client: Arc<CdpClient>, interval: Duration, on_approval: F) -> Self
    where
        F: Fn(ApprovalSignal) + Send + Sync + 'static,
    {
        let probe = ApprovalProbe {
            client: Arc::clone(&client),
        };
        let poller = Poller::start(probe, interval, None, on_approval);
        Self { client, poller }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.poller.is_active()
    }

    pub async fn stop(&self) {
        self.poller.stop().await;
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn approve_button(&self, text: &str) -> Result<ClickResult, BridgeFailure> {
        self.click(text).await
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn deny_button(&self, text: &str) -> Result<ClickResult, BridgeFailure> {
        self.click(text).await
    }

    async fn click(&self, text: &str) -> Result<ClickResult, BridgeFailure> {
        let value = self.client.evaluate(&scripts::click_by_text(text)).await?;
        Ok(ClickResult::from_script_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_result_parses_script_value() {
        let value = serde_json::json!({"ok": true, "method": "click"});
        let result = ClickResult::from_script_value(&value);
        assert!(result.ok);
        assert_eq!(result.method.as_deref(), Some("click"));
    }
}
