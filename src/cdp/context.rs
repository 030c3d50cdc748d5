use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::types::CdpEvent;

/// Frame-name patterns checked in order; the first context whose frame name
/// contains one of these (case-insensitive) becomes primary.
const PRIMARY_FRAME_PATTERNS: [&str; 2] = ["cascade", "workbench"];

/// A JavaScript realm inside a CDP target.
///
/// Created on `Runtime.executionContextCreated`, removed on
/// `…Destroyed`/`…sCleared`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub context_id: i64,
    pub frame_name: Option<String>,
    pub url: Option<String>,
}

/// Tracks live execution contexts and the current primary-context selection.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<i64, ExecutionContext>,
    primary: Option<i64>,
}

impl ContextRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a context, then re-run primary selection.
    pub fn created(&mut self, ctx: ExecutionContext) {
        self.contexts.insert(ctx.context_id, ctx);
        self.reselect_primary();
    }

    /// Remove a single context (`executionContextDestroyed`).
    pub fn destroyed(&mut self, context_id: i64) {
        self.contexts.remove(&context_id);
        if self.primary == Some(context_id) {
            self.primary = None;
        }
        self.reselect_primary();
    }

    /// Drop every context (`executionContextsCleared`), e.g. on navigation.
    pub fn cleared(&mut self) {
        self.contexts.clear();
        self.primary = None;
    }

    #[must_use]
    pub fn primary_context_id(&self) -> Option<i64> {
        self.primary
    }

    #[must_use]
    pub fn context(&self, context_id: i64) -> Option<&ExecutionContext> {
        self.contexts.get(&context_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Re-run the primary-context heuristic: ordered frame-name patterns first,
    /// then the lowest surviving context id.
    fn reselect_primary(&mut self) {
        if let Some(current) = self.primary {
            if self.contexts.contains_key(&current) {
                return;
            }
        }

        for pattern in PRIMARY_FRAME_PATTERNS {
            if let Some(ctx) = self.contexts.values().find(|c| {
                c.frame_name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(pattern))
            }) {
                self.primary = Some(ctx.context_id);
                return;
            }
        }

        self.primary = self.contexts.keys().min().copied();
    }
}

/// Parse an `executionContextCreated` event's `params.context` object.
fn parse_created(params: &serde_json::Value) -> Option<ExecutionContext> {
    let ctx = params.get("context")?;
    let context_id = ctx.get("id")?.as_i64()?;
    let frame_name = ctx
        .get("name")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
        .or_else(|| {
            ctx.get("auxData")
                .and_then(|a| a.get("frameId"))
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
        });
    let url = ctx.get("origin").and_then(|v| v.as_str()).map(ToOwned::to_owned);
    Some(ExecutionContext {
        context_id,
        frame_name,
        url,
    })
}

/// Parse an `executionContextDestroyed` event's `params.executionContextId`.
fn parse_destroyed(params: &serde_json::Value) -> Option<i64> {
    params.get("executionContextId")?.as_i64()
}

/// Spawn a background task that keeps `registry` in sync with the three
/// `Runtime.executionContext*` events, following the usual
/// subscribe-then-background-task shape used elsewhere for long-lived event
/// watchers.
///
/// Sends `()` on `changed_tx` whenever the registry's contents change, so the
/// caller can fan out a `ContextsChanged` lifecycle event.
pub fn spawn_context_tracker(
    registry: Arc<Mutex<ContextRegistry>>,
    mut created_rx: mpsc::Receiver<CdpEvent>,
    mut destroyed_rx: mpsc::Receiver<CdpEvent>,
    mut cleared_rx: mpsc::Receiver<CdpEvent>,
    changed_tx: mpsc::Sender<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = created_rx.recv() => {
                    if let Some(ctx) = parse_created(&event.params) {
                        registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner).created(ctx);
                        let _ = changed_tx.send(()).await;
                    }
                }
                Some(event) = destroyed_rx.recv() => {
                    if let Some(id) = parse_destroyed(&event.params) {
                        registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner).destroyed(id);
                        let _ = changed_tx.send(()).await;
                    }
                }
                Some(_) = cleared_rx.recv() => {
                    registry.lock().unwrap_or_else(std::sync::PoisonError::into_inner).cleared();
                    let _ = changed_tx.send(()).await;
                }
                else => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: i64, frame_name: Option<&str>) -> ExecutionContext {
        ExecutionContext {
            context_id: id,
            frame_name: frame_name.map(ToOwned::to_owned),
            url: None,
        }
    }

    #[test]
    fn primary_selects_cascade_pattern() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(1, Some("plain-frame")));
        reg.created(ctx(2, Some("Cascade-Panel")));
        assert_eq!(reg.primary_context_id(), Some(2));
    }

    #[test]
    fn primary_falls_back_to_lowest_id() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(5, None));
        reg.created(ctx(3, None));
        assert_eq!(reg.primary_context_id(), Some(3));
    }

    #[test]
    fn primary_prefers_cascade_over_workbench_order() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(1, Some("workbench-main")));
        reg.created(ctx(2, Some("cascade-chat")));
        assert_eq!(reg.primary_context_id(), Some(2));
    }

    #[test]
    fn destroying_primary_reselects() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(1, Some("cascade")));
        reg.created(ctx(2, None));
        assert_eq!(reg.primary_context_id(), Some(1));
        reg.destroyed(1);
        assert_eq!(reg.primary_context_id(), Some(2));
    }

    #[test]
    fn cleared_empties_registry() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(1, Some("cascade")));
        reg.cleared();
        assert!(reg.is_empty());
        assert_eq!(reg.primary_context_id(), None);
    }

    #[test]
    fn destroying_non_primary_keeps_primary() {
        let mut reg = ContextRegistry::new();
        reg.created(ctx(1, Some("cascade")));
        reg.created(ctx(2, None));
        reg.destroyed(2);
        assert_eq!(reg.primary_context_id(), Some(1));
    }

    #[test]
    fn parse_created_reads_context_id() {
        let params = serde_json::json!({
            "context": { "id": 42, "name": "cascade-root", "origin": "https://example" }
        });
        let ctx = parse_created(&params).unwrap();
        assert_eq!(ctx.context_id, 42);
        assert_eq!(ctx.frame_name.as_deref(), Some("cascade-root"));
    }

    #[test]
    fn parse_created_prefers_name_over_aux_data_frame_id() {
        let params = serde_json::json!({
            "context": {
                "id": 42,
                "name": "workbench-main",
                "origin": "https://example",
                "auxData": { "frameId": "3EFA1B2C..." }
            }
        });
        let ctx = parse_created(&params).unwrap();
        assert_eq!(ctx.frame_name.as_deref(), Some("workbench-main"));
    }

    #[test]
    fn parse_created_falls_back_to_aux_data_frame_id_when_name_absent() {
        let params = serde_json::json!({
            "context": {
                "id": 42,
                "origin": "https://example",
                "auxData": { "frameId": "3EFA1B2C..." }
            }
        });
        let ctx = parse_created(&params).unwrap();
        assert_eq!(ctx.frame_name.as_deref(), Some("3EFA1B2C..."));
    }

    #[test]
    fn parse_destroyed_reads_id() {
        let params = serde_json::json!({ "executionContextId": 7 });
        assert_eq!(parse_destroyed(&params), Some(7));
    }
}
