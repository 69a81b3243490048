//! Activity Log Sink (§4.H) — append-only, best-effort event emitter.
//! A failed sink must never affect the decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Scan,
    Evaluate,
    Trade,
    Exit,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub token_symbol: String,
    pub token_address: String,
    pub level: ActivityLevel,
    pub category: ActivityCategory,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ActivityLogSink: Send + Sync {
    async fn emit(&self, entry: ActivityEntry);
}

/// Bounded `tokio::sync::mpsc`-backed default sink. Emission never
/// blocks the caller beyond a best-effort `try_send`; a full channel
/// drops the entry and logs a warning rather than propagating failure.
pub struct ChannelActivitySink {
    sender: mpsc::Sender<ActivityEntry>,
}

impl ChannelActivitySink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActivityEntry>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ActivityLogSink for ChannelActivitySink {
    async fn emit(&self, entry: ActivityEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            warn!(error = %e, "activity log sink dropped an entry, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_entry() {
        let (sink, mut rx) = ChannelActivitySink::new(4);
        sink.emit(ActivityEntry {
            token_symbol: "TEST".into(),
            token_address: "mint1".into(),
            level: ActivityLevel::Info,
            category: ActivityCategory::Evaluate,
            message: "evaluated".into(),
            details: None,
            timestamp: Utc::now(),
        })
        .await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "evaluated");
    }

    #[tokio::test]
    async fn test_channel_sink_drops_silently_when_full() {
        let (sink, _rx) = ChannelActivitySink::new(1);
        for _ in 0..3 {
            sink.emit(ActivityEntry {
                token_symbol: "TEST".into(),
                token_address: "mint1".into(),
                level: ActivityLevel::Info,
                category: ActivityCategory::Scan,
                message: "tick".into(),
                details: None,
                timestamp: Utc::now(),
            })
            .await;
        }
    }
}
