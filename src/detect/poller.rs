//! Shared polling idiom for the detector family: every detector is a
//! `Start/Stop/IsActive` wrapper around one DOM probe, deduplicated through
//! a [`DetectorCursor`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeFailure;
use crate::model::DetectorCursor;

/// One probe evaluation. `Ok(None)` means "no signal this cycle" and clears
/// the dedup cursor so the same event can re-fire later; `Ok(Some((key,
/// value)))` carries the dedup key alongside the signal payload.
#[async_trait]
pub trait Probe: Send + Sync {
    type Signal: Send + 'static;

    async fn poll(&self) -> Result<Option<(String, Self::Signal)>, BridgeFailure>;
}

/// A running poller task. Dropping the handle does not stop the task — call
/// [`Poller::stop`] explicitly, as the detector owner does on teardown.
pub struct Poller {
    active: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
}

impl Poller {
    /// Start polling `probe` at `interval`, invoking `on_signal` whenever a
    /// fresh (non-duplicate, cooldown-elapsed) signal arrives.
    pub fn start<P, F>(probe: P, interval: Duration, cooldown: Option<Duration>, on_signal: F) -> Self
    where
        P: Probe + 'static,
        F: Fn(P::Signal) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = mpsc::channel(1);
        let task_active = Arc::clone(&active);

        tokio::spawn(async move {
            let mut cursor = DetectorCursor::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match probe.poll().await {
                            Ok(Some((key, value))) => {
                                if cursor.should_fire(Some(&key), cooldown) {
                                    on_signal(value);
                                }
                            }
                            Ok(None) => {
                                cursor.should_fire(None, cooldown);
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "detector probe failed");
                            }
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

    /// Idempotent: stopping an already-stopped poller is a no-op.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(()).await;
    }
}
