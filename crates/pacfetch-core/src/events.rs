//! Progress and status events.
//!
//! Events flow to an [`EventSink`] supplied by the caller (a GUI queue, a
//! log). The per-session [`EventEmitter`] remembers the last value sent for
//! each category and drops consecutive duplicates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Per-file progress, 0.0 to 1.0.
    Percent,
    /// Overall progress of the pass, 0.0 to 1.0.
    DownloadsPercent,
    /// Human readable status line.
    Info,
    /// Transfer details (percent and speed) for the current file.
    ProgressBarShowText,
    /// Visibility of the download stage (`show` / `hide`).
    DownloadsProgressBar,
    /// A package whose metalink carries no usable checksum.
    CachePkgsMd5CheckFailed,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Percent => "percent",
            EventCategory::DownloadsPercent => "downloads_percent",
            EventCategory::Info => "info",
            EventCategory::ProgressBarShowText => "progress_bar_show_text",
            EventCategory::DownloadsProgressBar => "downloads_progress_bar",
            EventCategory::CachePkgsMd5CheckFailed => "cache_pkgs_md5_check_failed",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for EventValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventValue::Number(n) => write!(f, "{:.2}", n),
            EventValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for EventValue {
    fn from(n: f64) -> Self {
        EventValue::Number(n)
    }
}

impl From<&str> for EventValue {
    fn from(s: &str) -> Self {
        EventValue::Text(s.to_string())
    }
}

impl From<String> for EventValue {
    fn from(s: String) -> Self {
        EventValue::Text(s)
    }
}

/// A single `(category, value)` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub category: EventCategory,
    pub value: EventValue,
}

impl ProgressEvent {
    /// Numeric value, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self.value {
            EventValue::Number(n) => Some(n),
            EventValue::Text(_) => None,
        }
    }
}

/// Receiver of progress events.
///
/// `emit` must neither block nor fail; a sink that can't keep up drops
/// events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Shared sink handle.
pub type DynEventSink = Arc<dyn EventSink>;

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        match event.category {
            EventCategory::Info | EventCategory::CachePkgsMd5CheckFailed => {
                if let EventValue::Text(text) = &event.value {
                    if !text.is_empty() {
                        info!("{}", text);
                    }
                }
            }
            _ => debug!("{}: {}", event.category, event.value),
        }
    }
}

/// Sink forwarding events into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Event queue is full, dropping {} event", event.category);
            }
            // Receiver gone; nobody is listening anymore
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Per-session event emitter with last-value de-duplication.
pub struct EventEmitter {
    sink: DynEventSink,
    last_event: Mutex<HashMap<EventCategory, String>>,
}

impl EventEmitter {
    pub fn new(sink: DynEventSink) -> Self {
        Self {
            sink,
            last_event: Mutex::new(HashMap::new()),
        }
    }

    /// Emitter that discards all events.
    pub fn null() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Send an event unless it repeats the last value of its category.
    ///
    /// Returns whether the event was forwarded.
    pub fn add(&self, category: EventCategory, value: impl Into<EventValue>) -> bool {
        let value = value.into();
        let rendered = value.to_string();
        {
            let mut last = self
                .last_event
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if last.get(&category) == Some(&rendered) {
                return false;
            }
            last.insert(category, rendered);
        }
        self.sink.emit(ProgressEvent { category, value });
        true
    }

    pub fn percent(&self, fraction: f64) -> bool {
        self.add(EventCategory::Percent, fraction)
    }

    pub fn downloads_percent(&self, fraction: f64) -> bool {
        self.add(EventCategory::DownloadsPercent, fraction)
    }

    pub fn info(&self, text: impl Into<String>) -> bool {
        self.add(EventCategory::Info, text.into())
    }

    /// Last value sent for a category, as rendered text.
    pub fn last(&self, category: EventCategory) -> Option<String> {
        self.last_event
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&category)
            .cloned()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

/// Format a transfer status line: `"{percent}%   {speed}"`.
pub fn format_progress_message(fraction: f64, bytes_per_sec: f64) -> String {
    let percent = (fraction * 100.0).clamp(0.0, 100.0) as u32;

    if bytes_per_sec >= 1_048_576.0 {
        format!("{}%   {:.2} Mbps", percent, bytes_per_sec / 1_048_576.0)
    } else if bytes_per_sec >= 1024.0 {
        format!("{}%   {:.2} Kbps", percent, bytes_per_sec / 1024.0)
    } else {
        format!("{}%   {:.2} bps", percent, bytes_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert_eq!(EventCategory::DownloadsPercent.as_str(), "downloads_percent");
        assert_eq!(
            EventCategory::ProgressBarShowText.to_string(),
            "progress_bar_show_text"
        );
    }

    #[test]
    fn test_number_rendered_with_two_decimals() {
        assert_eq!(EventValue::Number(0.5).to_string(), "0.50");
        assert_eq!(EventValue::Number(1.0).to_string(), "1.00");
    }

    #[tokio::test]
    async fn test_emitter_drops_duplicates() {
        let (sink, mut rx) = ChannelSink::channel(16);
        let emitter = EventEmitter::new(Arc::new(sink));

        assert!(emitter.percent(0.1));
        assert!(!emitter.percent(0.1));
        // Same two-decimal rendering counts as a duplicate
        assert!(!emitter.percent(0.101));
        assert!(emitter.percent(0.2));
        assert!(emitter.info("Fetching bash"));
        assert!(!emitter.info("Fetching bash"));
        // Categories are tracked separately
        assert!(emitter.downloads_percent(0.2));

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert_eq!(emitter.last(EventCategory::Percent).as_deref(), Some("0.20"));
    }

    #[test]
    fn test_channel_sink_never_blocks_when_full() {
        let (sink, _rx) = ChannelSink::channel(1);
        sink.emit(ProgressEvent {
            category: EventCategory::Info,
            value: "a".into(),
        });
        // Second event is dropped instead of blocking
        sink.emit(ProgressEvent {
            category: EventCategory::Info,
            value: "b".into(),
        });
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        sink.emit(ProgressEvent {
            category: EventCategory::Percent,
            value: 0.5.into(),
        });
    }

    #[test]
    fn test_format_progress_message() {
        assert_eq!(format_progress_message(0.5, 512.0), "50%   512.00 bps");
        assert_eq!(format_progress_message(0.25, 2048.0), "25%   2.00 Kbps");
        assert_eq!(format_progress_message(1.5, 3_145_728.0), "100%   3.00 Mbps");
    }
}
