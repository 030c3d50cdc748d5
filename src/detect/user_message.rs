//! `UserMessageDetector`: observes the latest user-authored chat bubble in
//! the assistant UI and forwards genuinely new ones.
//!
//! Unlike the other detectors this isn't simple key-equality dedup: it
//! primes on start (the first non-empty detection seeds state without
//! firing, so pre-existing messages aren't replayed as new), and thereafter
//! consults a bounded `seenHashes` ring (cap 50, 60s TTL matching
//! `EchoTable`) plus the bridge's `EchoTable` before firing, so the same
//! text can forward again once both tables have aged it out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::cdp::CdpClient;
use crate::dedup::{DedupTable, hash_text};
use crate::error::{BridgeFailure, FailureKind};
use crate::model::EchoTable;
use crate::scripts;

const SEEN_HASHES_CAPACITY: usize = 50;
/// Matches `EchoTable`'s TTL so a message blocked by either table becomes
/// forwardable again at the same time, rather than being blocked forever.
const SEEN_HASHES_TTL: Duration = Duration::from_secs(60);

struct Cursor {
    primed: bool,
    last_hash: Option<u64>,
    seen_hashes: DedupTable<u64>,
}

pub struct UserMessageDetector {
    active: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
}

impl UserMessageDetector {
    pub fn start<F>(
        client: Arc<CdpClient>,
        echo_table: Arc<Mutex<EchoTable>>,
        interval: Duration,
        on_user_message: F,
    ) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let task_active = Arc::clone(&active);

        tokio::spawn(async move {
            let mut cursor = Cursor {
                primed: false,
                last_hash: None,
                seen_hashes: DedupTable::new(SEEN_HASHES_CAPACITY, SEEN_HASHES_TTL),
            };
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match probe_once(&client).await {
                            Ok(Some(text)) => {
                                handle_observation(&mut cursor, &echo_table, &on_user_message, text);
                            }
                            Ok(None) => {}
                            Err(e) => tracing::debug!(error = %e, "user-message probe failed"),
                        }
                    }
                    _ = stop_rx.recv() => break,
                }
            }
            task_active.store(false, Ordering::SeqCst);
        });

        Self { active, stop_tx }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn stop(&self) {
        let _ = self.stop_tx.send(()).await;
    }
}

fn handle_observation(
    cursor: &mut Cursor,
    echo_table: &Arc<Mutex<EchoTable>>,
    on_user_message: &(dyn Fn(String) + Send + Sync),
    text: String,
) {
    let hash = hash_text(&text);

    if !cursor.primed {
        cursor.primed = true;
        cursor.last_hash = Some(hash);
        cursor.seen_hashes.insert(hash);
        return;
    }

    if cursor.last_hash == Some(hash) {
        return;
    }
    if cursor.seen_hashes.contains(&hash) {
        return;
    }

    cursor.last_hash = Some(hash);
    cursor.seen_hashes.insert(hash);

    let is_echo = echo_table
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .is_echo(&text);
    if is_echo {
        return;
    }

    on_user_message(text);
}

async fn probe_once(client: &CdpClient) -> Result<Option<String>, BridgeFailure> {
    let value = client.evaluate(scripts::USER_MESSAGE_PROBE).await?;
    if value.is_null() {
        return Ok(None);
    }
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s)
            .map_err(|e| BridgeFailure::new(FailureKind::InvalidPayload, e.to_string()))?,
        None => value,
    };
    let text = parsed
        .get("text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if text.is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priming_pass_seeds_without_firing() {
        let mut cursor = Cursor {
            primed: false,
            last_hash: None,
            seen_hashes: DedupTable::new(SEEN_HASHES_CAPACITY, SEEN_HASHES_TTL),
        };
        let echo_table = Arc::new(Mutex::new(EchoTable::new()));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_cb = Arc::clone(&fired);
        let callback = move |text: String| fired_cb.lock().unwrap().push(text);

        handle_observation(&mut cursor, &echo_table, &callback, "hello".to_owned());
        assert!(fired.lock().unwrap().is_empty());
        assert!(cursor.primed);
    }

    #[test]
    fn distinct_message_after_priming_fires() {
        let mut cursor = Cursor {
            primed: false,
            last_hash: None,
            seen_hashes: DedupTable::new(SEEN_HASHES_CAPACITY, SEEN_HASHES_TTL),
        };
        let echo_table = Arc::new(Mutex::new(EchoTable::new()));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_cb = Arc::clone(&fired);
        let callback = move |text: String| fired_cb.lock().unwrap().push(text);

        handle_observation(&mut cursor, &echo_table, &callback, "first".to_owned());
        handle_observation(&mut cursor, &echo_table, &callback, "second".to_owned());
        assert_eq!(*fired.lock().unwrap(), vec!["second".to_owned()]);
    }

    #[test]
    fn echoed_message_is_suppressed() {
        let mut cursor = Cursor {
            primed: true,
            last_hash: None,
            seen_hashes: DedupTable::new(SEEN_HASHES_CAPACITY, SEEN_HASHES_TTL),
        };
        let echo_table = Arc::new(Mutex::new(EchoTable::new()));
        echo_table.lock().unwrap().record("injected by bridge");
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_cb = Arc::clone(&fired);
        let callback = move |text: String| fired_cb.lock().unwrap().push(text);

        handle_observation(
            &mut cursor,
            &echo_table,
            &callback,
            "injected by bridge".to_owned(),
        );
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn same_text_forwards_again_once_seen_hashes_entry_expires() {
        let mut cursor = Cursor {
            primed: true,
            last_hash: None,
            seen_hashes: DedupTable::new(SEEN_HASHES_CAPACITY, Duration::from_millis(1)),
        };
        let echo_table = Arc::new(Mutex::new(EchoTable::new()));
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_cb = Arc::clone(&fired);
        let callback = move |text: String| fired_cb.lock().unwrap().push(text);

        handle_observation(&mut cursor, &echo_table, &callback, "hello".to_owned());
        std::thread::sleep(Duration::from_millis(5));
        // A different reading in between clears `last_hash` so the repeat
        // isn't short-circuited by the immediate-repeat check.
        handle_observation(&mut cursor, &echo_table, &callback, "other".to_owned());
        handle_observation(&mut cursor, &echo_table, &callback, "hello".to_owned());

        assert_eq!(
            *fired.lock().unwrap(),
            vec!["hello".to_owned(), "other".to_owned(), "hello".to_owned()]
        );
    }
}
