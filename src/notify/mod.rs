//! Notification module - Outbound alerts
//!
//! Best-effort delivery: a failed notification is logged and never feeds
//! back into signal logic.

mod telegram;

pub use telegram::{Outbox, TelegramNotifier};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::types::Instrument;

/// Destination for human-readable alerts
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver (or buffer) one message
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;

    /// Push out anything held back by rate limiting
    async fn flush(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes alerts to the local log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "regimewatch::alert", "📨 {}", text);
        Ok(())
    }
}

/// Telegram when credentials are present, local log otherwise
pub fn build_notifier(config: &NotifierConfig) -> Arc<dyn NotificationSink> {
    match TelegramNotifier::new(config) {
        Ok(notifier) => {
            tracing::info!(
                min_interval_secs = config.min_interval_secs,
                buffer_size = config.buffer_size,
                "Telegram notifier enabled"
            );
            Arc::new(notifier)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Telegram notifier unavailable, alerts go to the log only");
            Arc::new(LogNotifier)
        }
    }
}

#[derive(Debug, Clone)]
struct ThrottleEntry {
    last_forwarded: i64,
    last_seen: i64,
    swallowed: u32,
}

/// Deduplicates repeated error warnings per (instrument, error text).
///
/// Entries outlive a recovery, so an instrument that fails every other
/// cycle is still held to one warning per cooldown.
#[derive(Debug)]
pub struct ErrorThrottle {
    cooldown_ms: i64,
    entries: HashMap<(Instrument, String), ThrottleEntry>,
}

impl ErrorThrottle {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_ms: i64::try_from(cooldown_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            entries: HashMap::new(),
        }
    }

    /// `Some(swallowed)` when the warning should be forwarded, carrying the
    /// number of identical warnings suppressed since the last forward.
    /// `None` when it falls inside the cooldown.
    pub fn check(&mut self, instrument: &Instrument, summary: &str, now: i64) -> Option<u32> {
        let key = (instrument.clone(), summary.to_string());
        match self.entries.get_mut(&key) {
            Some(entry) if now - entry.last_forwarded < self.cooldown_ms => {
                entry.last_seen = now;
                entry.swallowed = entry.swallowed.saturating_add(1);
                None
            }
            Some(entry) => {
                let swallowed = entry.swallowed;
                entry.last_forwarded = now;
                entry.last_seen = now;
                entry.swallowed = 0;
                Some(swallowed)
            }
            None => {
                self.entries.insert(
                    key,
                    ThrottleEntry {
                        last_forwarded: now,
                        last_seen: now,
                        swallowed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Drop entries not seen for a whole cooldown
    pub fn prune(&mut self, now: i64) {
        let cooldown_ms = self.cooldown_ms;
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.last_seen) < cooldown_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
