//! Stream client configuration.

use std::time::Duration;

/// Configuration for stream client channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Per-client channel capacity. A client whose channel is full when an
    /// event is published counts as a failed write.
    pub buffer_size: usize,
    /// Interval between keep-alive comments.
    pub keep_alive: Option<Duration>,
    /// Reconnect hint sent as the first frame.
    pub retry: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64,
            keep_alive: Some(Duration::from_secs(15)),
            retry: Some(Duration::from_secs(3)),
        }
    }
}

impl StreamConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the channel capacity. Zero is raised to one.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    /// Disables keep-alive comments.
    #[must_use]
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive = None;
        self
    }

    /// Sets the reconnect hint.
    #[must_use]
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Omits the reconnect hint.
    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.retry = None;
        self
    }
}
