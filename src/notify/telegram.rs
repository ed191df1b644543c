//! Telegram Bot API notifier with a simple anti-spam window
//!
//! At most one message per `min_interval_secs`. Messages arriving sooner are
//! buffered and folded into the next send (only the newest `buffer_size`).

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::notify::NotificationSink;

/// Rate limiter plus aggregation buffer, driven by explicit timestamps
#[derive(Debug)]
pub struct Outbox {
    min_interval_ms: i64,
    capacity: usize,
    last_sent: Option<i64>,
    buffer: VecDeque<String>,
}

impl Outbox {
    pub fn new(min_interval_secs: u64, capacity: usize) -> Self {
        Self {
            min_interval_ms: min_interval_secs as i64 * 1000,
            capacity: capacity.max(1),
            last_sent: None,
            buffer: VecDeque::new(),
        }
    }

    fn window_open(&self, now: i64) -> bool {
        match self.last_sent {
            Some(last) => now - last >= self.min_interval_ms,
            None => true,
        }
    }

    /// Text to send right now, or `None` if `text` was buffered
    pub fn offer(&mut self, text: &str, now: i64) -> Option<String> {
        if !self.window_open(now) {
            if self.buffer.len() == self.capacity {
                self.buffer.pop_front();
            }
            self.buffer.push_back(text.to_string());
            return None;
        }

        self.last_sent = Some(now);
        let mut parts: Vec<String> = self.buffer.drain(..).collect();
        parts.push(text.to_string());
        Some(parts.join("\n"))
    }

    /// Buffered text that may go out now
    pub fn drain(&mut self, now: i64) -> Option<String> {
        if self.buffer.is_empty() || !self.window_open(now) {
            return None;
        }
        self.last_sent = Some(now);
        let parts: Vec<String> = self.buffer.drain(..).collect();
        Some(parts.join("\n"))
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
    outbox: Mutex<Outbox>,
}

impl TelegramNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let (token, chat_id) = config
            .telegram_credentials()
            .ok_or(NotifyError::MissingCredentials("telegram token or chat id"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.telegram_api_url.trim_end_matches('/'),
                token
            ),
            chat_id,
            outbox: Mutex::new(Outbox::new(config.min_interval_secs, config.buffer_size)),
        })
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let now = chrono::Utc::now().timestamp_millis();
        let outgoing = {
            let mut outbox = self.outbox.lock().await;
            let outgoing = outbox.offer(text, now);
            if outgoing.is_none() {
                tracing::debug!(pending = outbox.pending(), "Telegram rate limited, message buffered");
            }
            outgoing
        };

        match outgoing {
            Some(message) => self.send(&message).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<(), NotifyError> {
        let now = chrono::Utc::now().timestamp_millis();
        let outgoing = self.outbox.lock().await.drain(now);
        match outgoing {
            Some(message) => self.send(&message).await,
            None => Ok(()),
        }
    }
}
