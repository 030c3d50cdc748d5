//! `ProgressSink`: converts a stream of `onProgress(text)` updates into a
//! bounded, throttled outbound message stream.

use std::time::{Duration, Instant};

use crate::capability::{ChatTransport, MessageHandle};

/// Tunables resolved from `[sink]` config.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub throttle: Duration,
    pub max_message_len: usize,
    pub wrap_code_block: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_secs(3),
            max_message_len: 4000,
            wrap_code_block: false,
        }
    }
}

/// One channel's outbound progress stream.
///
/// Mutates only its own active-message pointer and buffer — callers
/// serialize access externally (the owning `SessionBridge`'s single-writer
/// path).
pub struct ProgressSink<T: ChatTransport> {
    transport: std::sync::Arc<T>,
    channel_id: String,
    config: SinkConfig,
    buffer: String,
    active_message: Option<MessageHandle>,
    last_flush: Option<Instant>,
}

impl<T: ChatTransport> ProgressSink<T> {
    #[must_use]
    pub fn new(transport: std::sync::Arc<T>, channel_id: String, config: SinkConfig) -> Self {
        Self {
            transport,
            channel_id,
            config,
            buffer: String::new(),
            active_message: None,
            last_flush: None,
        }
    }

    /// Buffer `text` as the latest full progress snapshot, flushing
    /// immediately if the throttle interval has elapsed.
    ///
    /// # Errors
    ///
    /// Returns the chat transport's error string if a send/edit fails.
    pub async fn append(&mut self, text: String) -> Result<(), String> {
        self.buffer = text;
        if self
            .last_flush
            .is_none_or(|t| t.elapsed() >= self.config.throttle)
        {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flush the buffer regardless of throttle state.
    ///
    /// # Errors
    ///
    /// Returns the chat transport's error string if a send/edit fails.
    pub async fn force_emit(&mut self) -> Result<(), String> {
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), String> {
        self.last_flush = Some(Instant::now());
        let rendered = self.render(&self.buffer);

        let Some(handle) = &self.active_message else {
            let handle = self.transport.send_message(&self.channel_id, &rendered).await?;
            self.active_message = Some(handle);
            return Ok(());
        };

        if rendered.len() > self.config.max_message_len {
            let handle = self.transport.send_message(&self.channel_id, &rendered).await?;
            self.active_message = Some(handle);
        } else {
            self.transport.edit_message(handle, &rendered).await?;
        }
        Ok(())
    }

    fn render(&self, text: &str) -> String {
        if self.config.wrap_code_block {
            format!("```\n{text}\n```")
        } else {
            text.to_owned()
        }
    }
}
