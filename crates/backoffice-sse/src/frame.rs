//! Event-stream wire frames.
//!
//! ```text
//! id: 7
//! event: update
//! data: {"kind":"store_status_changed","payload":{...}}
//!
//! ```
//!
//! Comments start with `:` and serve as keep-alives.

use std::time::Duration;

use backoffice_core::ApiEvent;
use bytes::Bytes;

use crate::error::SseResult;

/// One event-stream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    id: Option<String>,
    event: Option<String>,
    data: String,
    retry: Option<Duration>,
}

impl SseFrame {
    /// A frame carrying `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    /// A frame carrying one JSON-encoded event.
    pub fn from_event(event: &ApiEvent) -> SseResult<Self> {
        Ok(Self::new(serde_json::to_string(event)?))
    }

    /// Sets the event id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the event name.
    #[must_use]
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the reconnect hint.
    #[must_use]
    pub fn retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    /// The payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Encodes the frame. Multi-line data becomes one `data:` line per line.
    pub fn to_sse_string(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 16);
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        if self.data.is_empty() {
            out.push_str("data: \n");
        }
        for line in self.data.lines() {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        if let Some(retry) = self.retry {
            out.push_str("retry: ");
            out.push_str(&retry.as_millis().to_string());
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Anything written to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    /// A data frame.
    Frame(SseFrame),
    /// A comment line.
    Comment(String),
    /// A bare reconnect hint.
    Retry(Duration),
}

impl SseItem {
    /// An empty comment used as a keep-alive.
    pub fn keepalive() -> Self {
        Self::Comment(String::new())
    }

    /// Wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Frame(frame) => Bytes::from(frame.to_sse_string()),
            Self::Comment(text) => Bytes::from(format!(": {text}\n\n")),
            Self::Retry(retry) => Bytes::from(format!("retry: {}\n\n", retry.as_millis())),
        }
    }
}

impl From<SseFrame> for SseItem {
    fn from(frame: SseFrame) -> Self {
        Self::Frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_frame_is_single_json_message() {
        let event = ApiEvent::StoreStatusChanged {
            store_id: 4,
            status: json!({"open": true}),
        };
        let wire = SseFrame::from_event(&event).unwrap().to_sse_string();

        assert!(wire.starts_with("data: {"));
        assert!(wire.ends_with("\n\n"));
        assert_eq!(wire.matches("data: ").count(), 1);

        let payload = wire.trim_start_matches("data: ").trim_end();
        let decoded: ApiEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_multiline_data() {
        let wire = SseFrame::new("a\nb").id("1").event("note").to_sse_string();
        assert_eq!(wire, "id: 1\nevent: note\ndata: a\ndata: b\n\n");
    }

    #[test]
    fn test_retry_and_comment() {
        let frame = SseFrame::new("x").retry(Duration::from_secs(2));
        assert!(frame.to_sse_string().contains("retry: 2000\n"));
        assert_eq!(SseItem::keepalive().to_bytes(), Bytes::from(": \n\n"));
        assert_eq!(SseItem::Retry(Duration::from_secs(3)).to_bytes(), Bytes::from("retry: 3000\n\n"));
    }

    #[test]
    fn test_empty_data_still_dispatches() {
        assert_eq!(SseFrame::new("").to_sse_string(), "data: \n\n");
    }
}
