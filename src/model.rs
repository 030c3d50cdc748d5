//! Chat-domain data model: session and phase types that aren't CDP wire
//! types (those live in `cdp::types`/`cdp::context`).

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::dedup::DedupTable;

/// A discovered debug target, as returned by the discovery endpoint.
///
/// Used once to open the WebSocket, then dropped — it is not retained past
/// `CdpClient::connect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpTarget {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub url: String,
    pub ws_url: String,
}

/// A logical assistant chat session bound to one Discord channel.
///
/// Invariant: at most one `Session` per `channel_id`, enforced by whatever
/// owns the `channel_id → Session` map (a `Repository` implementation, not
/// this crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub title: String,
    pub workspace_name: String,
    pub channel_id: String,
    pub is_renamed: bool,
}

/// Phase of an in-progress assistant reply, tracked by `ResponseMonitor`.
///
/// Transitions are monotonic toward a terminal variant (`Complete`, `Timeout`,
/// `QuotaReached`) except `Disconnected`, which is re-entrant and restores the
/// prior non-terminal phase on reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseState {
    Waiting,
    Thinking,
    Generating,
    Complete,
    Timeout,
    QuotaReached,
    Disconnected,
}

impl PhaseState {
    /// True for the three phases a monitor cannot leave once entered (save
    /// for the re-entrant `Disconnected` detour).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Timeout | Self::QuotaReached)
    }
}

/// Per-poll-cycle bookkeeping for one `ResponseMonitor` run.
///
/// Created on `start`, discarded once a terminal phase fires.
#[derive(Debug)]
pub struct MonitorCursor {
    pub baseline_text: Option<String>,
    pub last_emitted_text: Option<String>,
    /// Last raw extraction seen, used only to detect activity for the
    /// inactivity timeout — distinct from `last_emitted_text`, which tracks
    /// what was actually reported via `onProgress`.
    pub last_observed_text: Option<String>,
    pub last_text_change_at: Instant,
    pub stop_gone_count: u32,
    pub generation_started: bool,
    seen_log_keys: VecDeque<String>,
    seen_log_capacity: usize,
    pub quota_detected: bool,
}

impl MonitorCursor {
    #[must_use]
    pub fn new(seen_log_capacity: usize) -> Self {
        Self {
            baseline_text: None,
            last_emitted_text: None,
            last_observed_text: None,
            last_text_change_at: Instant::now(),
            stop_gone_count: 0,
            generation_started: false,
            seen_log_keys: VecDeque::with_capacity(seen_log_capacity.min(1024)),
            seen_log_capacity,
            quota_detected: false,
        }
    }

    /// Record a text change, resetting the inactivity clock.
    pub fn note_text_change(&mut self) {
        self.last_text_change_at = Instant::now();
    }

    /// Key a process-log entry by its first 200 trimmed chars, returning
    /// `true` if it is new (and remembering it, evicting FIFO at capacity).
    pub fn note_log_entry(&mut self, entry: &str) -> bool {
        let key: String = entry.trim().chars().take(200).collect();
        if self.seen_log_keys.contains(&key) {
            return false;
        }
        if self.seen_log_keys.len() >= self.seen_log_capacity {
            self.seen_log_keys.pop_front();
        }
        self.seen_log_keys.push_back(key);
        true
    }
}

/// Per-`SessionBridge` table of hashes for messages the bridge itself posted.
///
/// The user-message detector consults this before forwarding an observed
/// bubble, so the bridge's own injections never echo back as new user input.
#[derive(Debug)]
pub struct EchoTable {
    table: DedupTable<u64>,
}

impl EchoTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: DedupTable::new(usize::MAX, std::time::Duration::from_secs(60)),
        }
    }

    /// Record that the bridge posted `text`.
    pub fn record(&mut self, text: &str) {
        self.table.insert(crate::dedup::hash_text(text));
    }

    /// True if `text` was posted by the bridge within the last 60s.
    pub fn is_echo(&mut self, text: &str) -> bool {
        self.table.contains(&crate::dedup::hash_text(text))
    }
}

impl Default for EchoTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-detector dedup cursor: remembers the last fired key, plus a per-key
/// cooldown so the *same* content re-appearing after a `null` gap doesn't
/// immediately re-fire (used by `ErrorPopupDetector`'s 10s cooldown).
#[derive(Debug, Default)]
pub struct DetectorCursor {
    pub last_key: Option<String>,
    fired_at: std::collections::HashMap<String, Instant>,
}

impl DetectorCursor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a freshly-probed `key` (`None` = no signal) should
    /// fire, given an optional cooldown. Updates cursor state as a side
    /// effect: firing keys are remembered, `None` clears `last_key` so the
    /// same key can re-fire later (subject to cooldown).
    pub fn should_fire(&mut self, key: Option<&str>, cooldown: Option<std::time::Duration>) -> bool {
        let Some(key) = key else {
            self.last_key = None;
            return false;
        };

        if self.last_key.as_deref() == Some(key) {
            return false;
        }

        if let Some(cooldown) = cooldown {
            if let Some(last_fired) = self.fired_at.get(key) {
                if last_fired.elapsed() < cooldown {
                    self.last_key = Some(key.to_owned());
                    return false;
                }
            }
        }

        self.last_key = Some(key.to_owned());
        self.fired_at.insert(key.to_owned(), Instant::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn phase_state_terminal_classification() {
        assert!(PhaseState::Complete.is_terminal());
        assert!(PhaseState::Timeout.is_terminal());
        assert!(PhaseState::QuotaReached.is_terminal());
        assert!(!PhaseState::Waiting.is_terminal());
        assert!(!PhaseState::Disconnected.is_terminal());
    }

    #[test]
    fn monitor_cursor_log_dedup() {
        let mut cursor = MonitorCursor::new(200);
        assert!(cursor.note_log_entry("Reading foo.rs"));
        assert!(!cursor.note_log_entry("Reading foo.rs"));
        assert!(cursor.note_log_entry("Reading bar.rs"));
    }

    #[test]
    fn monitor_cursor_log_capacity_evicts() {
        let mut cursor = MonitorCursor::new(2);
        assert!(cursor.note_log_entry("a"));
        assert!(cursor.note_log_entry("b"));
        assert!(cursor.note_log_entry("c"));
        // "a" should have been evicted, so it can fire again.
        assert!(cursor.note_log_entry("a"));
    }

    #[test]
    fn echo_table_records_and_detects() {
        let mut table = EchoTable::new();
        assert!(!table.is_echo("hello"));
        table.record("hello");
        assert!(table.is_echo("hello"));
        assert!(!table.is_echo("world"));
    }

    #[test]
    fn detector_cursor_dedup_law_k_k_k_null_k() {
        let mut cursor = DetectorCursor::new();
        let stream = ["K", "K", "K"];
        let mut fires = 0;
        for k in stream {
            if cursor.should_fire(Some(k), None) {
                fires += 1;
            }
        }
        if cursor.should_fire(None, None) {
            fires += 1;
        }
        if cursor.should_fire(Some("K"), None) {
            fires += 1;
        }
        assert_eq!(fires, 2);
    }

    #[test]
    fn detector_cursor_respects_cooldown() {
        let mut cursor = DetectorCursor::new();
        assert!(cursor.should_fire(Some("A"), Some(Duration::from_secs(10))));
        // Different key arrives immediately — should still fire since it's a
        // distinct key from last_key, regardless of cooldown on the clock.
        assert!(cursor.should_fire(Some("B"), Some(Duration::from_secs(10))));
    }
}
