use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::EventWriter;

pub const GENERATION_NOTICE_MS: u64 = 5000;
pub const DOWNLOAD_NOTICE_MS: u64 = 3000;
pub const GENERIC_FAILURE_DESCRIPTION: &str = "Please try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// A user-visible message produced by the avatar session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
    pub duration_ms: u64,
}

impl Notification {
    pub fn avatar_ready() -> Self {
        Self {
            title: "Yay! Your cute avatar is ready! 🎉".to_string(),
            description: "Take a look at your adorable new self!".to_string(),
            variant: NotificationVariant::Default,
            duration_ms: GENERATION_NOTICE_MS,
        }
    }

    /// Blank messages fall back to a generic retry hint.
    pub fn generation_failed(message: &str) -> Self {
        let trimmed = message.trim();
        Self {
            title: "Uh-oh! Something went wrong 😢".to_string(),
            description: if trimmed.is_empty() {
                GENERIC_FAILURE_DESCRIPTION.to_string()
            } else {
                trimmed.to_string()
            },
            variant: NotificationVariant::Destructive,
            duration_ms: GENERATION_NOTICE_MS,
        }
    }

    pub fn avatar_downloaded() -> Self {
        Self {
            title: "Woohoo! Avatar downloaded! 🌟".to_string(),
            description: "Your cuteness is now saved forever!".to_string(),
            variant: NotificationVariant::Default,
            duration_ms: DOWNLOAD_NOTICE_MS,
        }
    }

    pub fn download_failed() -> Self {
        Self {
            title: "Oops! Download hiccup! 🙈".to_string(),
            description: "Please try downloading again.".to_string(),
            variant: NotificationVariant::Destructive,
            duration_ms: DOWNLOAD_NOTICE_MS,
        }
    }

    pub fn is_error(&self) -> bool {
        self.variant == NotificationVariant::Destructive
    }
}

/// Destination for notifications emitted by the interaction logic.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Keeps every notification in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen.lock().ok().and_then(|seen| seen.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification.clone());
        }
    }
}

impl NotificationSink for EventWriter {
    fn notify(&self, notification: &Notification) {
        let payload =
            serde_json::to_value(notification).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Err(err) = self.emit_json("notification", payload) {
            tracing::warn!(path = %self.path().display(), "failed to record notification: {err:#}");
        }
    }
}

/// Forwards each notification to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, notification: &Notification) {
        for sink in &self.sinks {
            sink.notify(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;

    #[test]
    fn generation_failure_falls_back_to_generic_description() {
        assert_eq!(
            Notification::generation_failed("   ").description,
            GENERIC_FAILURE_DESCRIPTION
        );
        let notice = Notification::generation_failed("bad image");
        assert_eq!(notice.description, "bad image");
        assert!(notice.is_error());
        assert_eq!(notice.duration_ms, GENERATION_NOTICE_MS);
    }

    #[test]
    fn download_notices_are_short_lived() {
        assert_eq!(Notification::avatar_downloaded().duration_ms, 3000);
        assert!(!Notification::avatar_downloaded().is_error());
        assert!(Notification::download_failed().is_error());
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());
        sink.notify(&Notification::avatar_ready());
        sink.notify(&Notification::download_failed());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.notifications()[0], Notification::avatar_ready());
        assert_eq!(sink.last(), Some(Notification::download_failed()));
    }

    #[test]
    fn event_writer_records_notifications() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");
        writer.notify(&Notification::generation_failed("Server error: 500"));

        let raw = std::fs::read_to_string(&path)?;
        let row: Value = serde_json::from_str(raw.lines().next().unwrap_or(""))?;
        assert_eq!(row["type"], "notification");
        assert_eq!(row["variant"], "destructive");
        assert_eq!(row["description"], "Server error: 500");
        assert_eq!(row["duration_ms"], 5000);
        Ok(())
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = RecordingSink::new();
        let second = RecordingSink::new();
        let fanout = FanoutSink::new()
            .with(Arc::new(first.clone()))
            .with(Arc::new(second.clone()));
        fanout.notify(&Notification::avatar_ready());
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
