use crate::chrome::{self, TargetInfo};

use super::error::CdpError;

/// Result of a successful discovery pass: the winning target plus the port it
/// was found on (needed to build the final `ws://` URL if the target's own
/// `webSocketDebuggerUrl` is missing a host).
#[derive(Debug, Clone)]
pub struct DiscoveredTarget {
    pub port: u16,
    pub target: TargetInfo,
}

/// Scan `ports` in order, querying each for its `/json/list` target array.
///
/// Within the first port that answers, pick the target whose `title` or `url`
/// contains `workspace_hint` (case-insensitive substring), else the first
/// `type == "page"` target. Ties within a single port's target list resolve
/// to "first match" in list order; ports are tried in the given order and the
/// first one that yields any usable target wins (no cross-port merging).
///
/// # Errors
///
/// Returns `CdpError::Connection` if every port refuses the connection, or
/// `CdpError::InvalidResponse` if every port answers but none has a usable
/// page target.
pub async fn discover(ports: &[u16], workspace_hint: Option<&str>) -> Result<DiscoveredTarget, CdpError> {
    let mut saw_any_response = false;

    for &port in ports {
        let targets = match chrome::query_targets("127.0.0.1", port).await {
            Ok(t) => t,
            Err(_) => continue,
        };
        saw_any_response = true;

        if let Some(target) = select_target(&targets, workspace_hint) {
            return Ok(DiscoveredTarget { port, target });
        }
    }

    if saw_any_response {
        Err(CdpError::InvalidResponse(
            "no page target matched workspace hint on any port".into(),
        ))
    } else {
        Err(CdpError::Connection(format!(
            "no debuggable target found on ports {ports:?}"
        )))
    }
}

/// Pick a target from a single port's list, per the hint-then-fallback rule.
fn select_target(targets: &[TargetInfo], workspace_hint: Option<&str>) -> Option<TargetInfo> {
    if let Some(hint) = workspace_hint {
        let hint_lower = hint.to_lowercase();
        if let Some(matched) = targets.iter().find(|t| {
            t.title.to_lowercase().contains(&hint_lower) || t.url.to_lowercase().contains(&hint_lower)
        }) {
            return Some(matched.clone());
        }
    }

    targets
        .iter()
        .find(|t| t.target_type == "page")
        .cloned()
}
