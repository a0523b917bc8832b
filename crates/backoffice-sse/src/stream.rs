//! Per-client channels and the streaming response body.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval_at, Instant, Interval};

use crate::config::StreamConfig;
use crate::error::{SseError, SseResult};
use crate::frame::SseItem;
use crate::registry::ClientGuard;

/// Writing half of a client channel.
#[derive(Debug, Clone)]
pub struct SseSender {
    tx: mpsc::Sender<SseItem>,
    sent: Arc<AtomicU64>,
}

impl SseSender {
    /// Queues an item without waiting.
    ///
    /// Fails with [`SseError::ChannelFull`] when the client is not draining
    /// its channel and [`SseError::StreamClosed`] once it has disconnected.
    pub fn try_send(&self, item: SseItem) -> SseResult<()> {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SseError::ChannelFull),
            Err(TrySendError::Closed(_)) => Err(SseError::StreamClosed),
        }
    }

    /// Queues an item, waiting for capacity.
    pub async fn send(&self, item: SseItem) -> SseResult<()> {
        self.tx.send(item).await.map_err(|_| SseError::StreamClosed)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns true once the reading half is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Items queued so far.
    pub fn items_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

/// Reading half of a client channel, usable as a response body.
///
/// Yields the reconnect hint first (if configured), then queued items in
/// order, with keep-alive comments while idle. If the stream was handed out
/// by the fan-out registry, dropping it unregisters the client.
pub struct SseStream {
    rx: mpsc::Receiver<SseItem>,
    keep_alive: Option<Interval>,
    pending_retry: Option<SseItem>,
    guard: Option<ClientGuard>,
}

impl std::fmt::Debug for SseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseStream")
            .field("keep_alive", &self.keep_alive.as_ref().map(Interval::period))
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl SseStream {
    /// Creates a connected sender and stream.
    pub fn channel(config: &StreamConfig) -> (SseSender, Self) {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let keep_alive = config
            .keep_alive
            .map(|period| interval_at(Instant::now() + period, period));

        let sender = SseSender {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
        };
        let stream = Self {
            rx,
            keep_alive,
            pending_retry: config.retry.map(SseItem::Retry),
            guard: None,
        };
        (sender, stream)
    }

    pub(crate) fn with_guard(mut self, guard: ClientGuard) -> Self {
        self.guard = Some(guard);
        self
    }
}

impl Stream for SseStream {
    type Item = Result<Bytes, SseError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(retry) = self.pending_retry.take() {
            return Poll::Ready(Some(Ok(retry.to_bytes())));
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(Ok(item.to_bytes()))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if let Some(keep_alive) = self.keep_alive.as_mut() {
                    if keep_alive.poll_tick(cx).is_ready() {
                        return Poll::Ready(Some(Ok(SseItem::keepalive().to_bytes())));
                    }
                }
                Poll::Pending
            }
        }
    }
}

/// Headers for an event-stream response.
pub fn stream_headers() -> http::HeaderMap {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));
    // Disable proxy buffering
    headers.insert("x-accel-buffering", http::HeaderValue::from_static("no"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SseFrame;
    use futures_util::StreamExt;
    use std::time::Duration;

    fn quiet() -> StreamConfig {
        StreamConfig::new().without_keep_alive().without_retry().with_buffer_size(2)
    }

    #[tokio::test]
    async fn test_items_arrive_in_order() {
        let (sender, mut stream) = SseStream::channel(&quiet());
        sender.try_send(SseFrame::new("a").into()).unwrap();
        sender.send(SseFrame::new("b").into()).await.unwrap();
        drop(sender);

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("data: a\n\n"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("data: b\n\n"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_retry_hint_comes_first() {
        let config = quiet().with_retry(Duration::from_secs(5));
        let (sender, mut stream) = SseStream::channel(&config);
        sender.try_send(SseFrame::new("x").into()).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("retry: 5000\n\n"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from("data: x\n\n"));
    }

    #[tokio::test]
    async fn test_full_and_closed_channels() {
        let (sender, stream) = SseStream::channel(&quiet());
        sender.try_send(SseItem::keepalive()).unwrap();
        sender.try_send(SseItem::keepalive()).unwrap();
        assert!(matches!(sender.try_send(SseItem::keepalive()), Err(SseError::ChannelFull)));
        assert_eq!(sender.items_sent(), 2);

        drop(stream);
        assert!(sender.is_closed());
        assert!(matches!(sender.try_send(SseItem::keepalive()), Err(SseError::StreamClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_while_idle() {
        let config = quiet().with_keep_alive(Duration::from_secs(15));
        let (_sender, mut stream) = SseStream::channel(&config);

        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item, Bytes::from(": \n\n"));
    }

    #[test]
    fn test_stream_headers() {
        let headers = stream_headers();
        assert_eq!(headers[http::header::CONTENT_TYPE], "text/event-stream; charset=utf-8");
        assert_eq!(headers[http::header::CACHE_CONTROL], "no-cache, no-transform");
        assert_eq!(headers["x-accel-buffering"], "no");
    }
}
