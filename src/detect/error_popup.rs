//! `ErrorPopupDetector`: key = `title::body[0..100]`, 10s cooldown so the
//! same error doesn't spam chat every poll cycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cdp::CdpClient;
use crate::error::{BridgeFailure, FailureKind};
use crate::scripts;

use super::ClickResult;
use super::poller::{Poller, Probe};

const COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ErrorPopupSignal {
    pub title: String,
    pub body: String,
}

struct ErrorPopupProbe {
    client: Arc<CdpClient>,
}

#[async_trait]
impl Probe for ErrorPopupProbe {
    type Signal = ErrorPopupSignal;

    async fn poll(&self) -> Result<Option<(String, Self::Signal)>, BridgeFailure> {
        let value = self.client.evaluate(scripts::ERROR_POPUP_PROBE).await?;
        if value.is_null() {
            return Ok(None);
        }
        let parsed: serde_json::Value = match value.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| BridgeFailure::new(FailureKind::InvalidPayload, e.to_string()))?,
            None => value,
        };
        let title = parsed
            .get("title")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let body = parsed
            .get("body")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let body_prefix: String = body.chars().take(100).collect();
        let key = format!("{title}::{body_prefix}");
        Ok(Some((key, ErrorPopupSignal { title, body })))
    }
}

pub struct ErrorPopupDetector {
    client: Arc<CdpClient>,
    poller: Poller,
}

impl ErrorPopupDetector {
    pub fn start<F>(client: Arc<CdpClient>, interval: Duration, on_error: F) -> Self
    where
        F: Fn(ErrorPopupSignal) + Send + Sync + 'static,
    {
        let probe = ErrorPopupProbe {
            client: Arc::clone(&client),
        };
        let poller = Poller::start(probe, interval, Some(COOLDOWN), on_error);
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
    pub async fn click_dismiss(&self) -> Result<ClickResult, BridgeFailure> {
        self.click("Dismiss").await
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn click_retry(&self) -> Result<ClickResult, BridgeFailure> {
        self.click("Retry").await
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn click_copy_debug_info(&self) -> Result<ClickResult, BridgeFailure> {
        self.click("Copy Debug Info").await
    }

    /// Reads the system clipboard after a `ClickCopyDebugInfo`. A denied
    /// clipboard permission resolves to `Ok(None)`; the caller does not
    /// retry.
    ///
    /// # Errors
    ///
    /// Returns `BridgeFailure` only for a transport-level failure, not for
    /// clipboard permission denial.
    pub async fn read_clipboard(&self) -> Result<Option<String>, BridgeFailure> {
        match self
            .client
            .evaluate_await_promise(scripts::READ_CLIPBOARD)
            .await
        {
            Ok(value) => Ok(value.as_str().map(ToOwned::to_owned)),
            Err(_) => Ok(None),
        }
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
    fn cooldown_is_ten_seconds() {
        assert_eq!(COOLDOWN, Duration::from_secs(10));
    }
}
