//! `CdpPool`: maps `workspaceName → (CdpClient, SessionBridge)`. Lazily
//! creates a client on first prompt for a workspace and shares it across
//! every session bound to the same assistant instance.

use std::sync::Arc;

use dashmap::DashMap;

use crate::bridge::{BridgeConfig, SessionBridge};
use crate::capability::ChatTransport;
use crate::cdp::{CdpClient, CdpConfig};
use crate::config::ResolvedCdp;
use crate::error::BridgeFailure;

/// Normalize a free-form workspace path into the pool's map key: the final
/// path component, lowercased.
#[must_use]
pub fn normalize_workspace_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_lowercase()
}

struct Entry<T: ChatTransport> {
    client: Arc<CdpClient>,
    bridges: DashMap<String, Arc<SessionBridge<T>>>,
}

/// Shared pool of CDP connections keyed by normalized workspace name.
pub struct CdpPool<T: ChatTransport> {
    entries: DashMap<String, Arc<Entry<T>>>,
    discovery_ports: Vec<u16>,
    cdp: ResolvedCdp,
    bridge_config: BridgeConfig,
}

impl<T: ChatTransport + 'static> CdpPool<T> {
    #[must_use]
    pub fn new(discovery_ports: Vec<u16>, cdp: ResolvedCdp, bridge_config: BridgeConfig) -> Self {
        Self {
            entries: DashMap::new(),
            discovery_ports,
            cdp,
            bridge_config,
        }
    }

    /// Get the bridge for `workspace`/`channel_id`, connecting (and
    /// discovering the debug target) on first use.
    ///
    /// # Errors
    ///
    /// Returns `BridgeFailure` if no CDP target can be discovered for the
    /// workspace, or the WebSocket handshake fails.
    pub async fn get_or_connect(
        &self,
        workspace: &str,
        channel_id: &str,
        session_title: &str,
        transport: Arc<T>,
    ) -> Result<Arc<SessionBridge<T>>, BridgeFailure> {
        let key = normalize_workspace_name(workspace);

        if let Some(entry) = self.entries.get(&key) {
            if let Some(bridge) = entry.bridges.get(channel_id) {
                return Ok(Arc::clone(&bridge));
            }
            let bridge = SessionBridge::new(
                Arc::clone(&entry.client),
                transport,
                channel_id.to_owned(),
                session_title.to_owned(),
                self.bridge_config.clone(),
            );
            entry.bridges.insert(channel_id.to_owned(), Arc::clone(&bridge));
            return Ok(bridge);
        }

        let config = CdpConfig {
            connect_timeout: std::time::Duration::from_millis(self.cdp.connect_timeout_ms),
            command_timeout: std::time::Duration::from_millis(self.cdp.command_timeout_ms),
            channel_capacity: self.cdp.channel_capacity,
            reconnect: crate::cdp::ReconnectConfig {
                max_retries: self.cdp.reconnect_max_retries,
                initial_backoff: std::time::Duration::from_millis(self.cdp.reconnect_initial_backoff_ms),
                max_backoff: std::time::Duration::from_millis(self.cdp.reconnect_max_backoff_ms),
            },
        };

        let client = Arc::new(
            CdpClient::connect_discovered(&self.discovery_ports, Some(&key), config)
                .await
                .map_err(BridgeFailure::from)?,
        );

        let bridge = SessionBridge::new(
            Arc::clone(&client),
            transport,
            channel_id.to_owned(),
            session_title.to_owned(),
            self.bridge_config.clone(),
        );

        let bridges = DashMap::new();
        bridges.insert(channel_id.to_owned(), Arc::clone(&bridge));
        self.entries
            .insert(key, Arc::new(Entry { client, bridges }));

        Ok(bridge)
    }

    /// Tear down every bridge bound to `workspace` and drop its client.
    pub async fn release(&self, workspace: &str) {
        let key = normalize_workspace_name(workspace);
        if let Some((_, entry)) = self.entries.remove(&key) {
            for bridge in entry.bridges.iter() {
                bridge.shutdown().await;
            }
        }
    }
}
