//! `PlanningDetector`: mirrors `ApprovalDetector` for the planning dialog,
//! plus plan-content extraction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cdp::CdpClient;
use crate::error::{BridgeFailure, FailureKind};
use crate::scripts;

use super::ClickResult;
use super::poller::{Poller, Probe};

#[derive(Debug, Clone)]
pub struct PlanningSignal {
    pub button_text: String,
    pub description: String,
}

struct PlanningProbe {
    client: Arc<CdpClient>,
}

#[async_trait]
impl Probe for PlanningProbe {
    type Signal = PlanningSignal;

    async fn poll(&self) -> Result<Option<(String, Self::Signal)>, BridgeFailure> {
        let value = self.client.evaluate(scripts::PLANNING_PROBE).await?;
        if value.is_null() {
            return Ok(None);
        }
        let parsed: serde_json::Value = match value.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_err(|e| BridgeFailure::new(FailureKind::InvalidPayload, e.to_string()))?,
            None => value,
        };
        let button_text = parsed
            .get("buttonText")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Open")
            .to_owned();
        let description = parsed
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let key = format!("{button_text}::{description}");
        Ok(Some((
            key,
            PlanningSignal {
                button_text,
                description,
            },
        )))
    }
}

pub struct PlanningDetector {
    client: Arc<CdpClient>,
    poller: Poller,
}

impl PlanningDetector {
    pub fn start<F>(client: Arc<CdpClient>, interval: Duration, on_planning: F) -> Self
    where
        F: Fn(PlanningSignal) + Send + Sync + 'static,
    {
        let probe = PlanningProbe {
            client: Arc::clone(&client),
        };
        let poller = Poller::start(probe, interval, None, on_planning);
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
    pub async fn click_open_button(&self, text: &str) -> Result<ClickResult, BridgeFailure> {
        let value = self.client.evaluate(&scripts::click_by_text(text)).await?;
        Ok(ClickResult::from_script_value(&value))
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the click script cannot be evaluated.
    pub async fn click_proceed_button(&self, text: &str) -> Result<ClickResult, BridgeFailure> {
        let value = self.client.evaluate(&scripts::click_by_text(text)).await?;
        Ok(ClickResult::from_script_value(&value))
    }

    /// # Errors
    ///
    /// Returns `BridgeFailure` if the extraction script cannot be evaluated.
    pub async fn extract_plan_content(&self) -> Result<String, BridgeFailure> {
        let value = self
            .client
            .evaluate(scripts::EXTRACT_PLAN_CONTENT)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }
}
