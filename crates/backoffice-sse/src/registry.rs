//! The event fan-out registry.
//!
//! One registry is created at startup and shared by handle. It owns the live
//! set of stream clients and is the only place events are written to them.
//!
//! Delivery is best-effort and at-most-once. Each publish writes to every
//! selected client's channel without waiting, so one slow or dead client never
//! holds up the rest. A failed write removes that client. Events for a single
//! client arrive in the order they were published; there is no ordering across
//! clients and no replay for clients that connect later.

use std::fmt;
use std::sync::Arc;

use backoffice_core::{ApiEvent, EventPublisher};
use backoffice_telemetry::metrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StreamConfig;
use crate::error::{SseError, SseResult};
use crate::frame::{SseFrame, SseItem};
use crate::stream::{SseSender, SseStream};

/// Identifier of one stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// A fresh, time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One open stream connection.
#[derive(Debug, Clone)]
pub struct StreamClient {
    store_id: Option<i64>,
    sender: SseSender,
}

impl StreamClient {
    /// A client receiving events for every store.
    #[must_use]
    pub fn new(sender: SseSender) -> Self {
        Self { store_id: None, sender }
    }

    /// A client scoped to one store.
    #[must_use]
    pub fn for_store(sender: SseSender, store_id: i64) -> Self {
        Self {
            store_id: Some(store_id),
            sender,
        }
    }

    /// The store this client follows, if scoped.
    pub fn store_id(&self) -> Option<i64> {
        self.store_id
    }

    /// Whether a scoped publish of `event` reaches this client.
    ///
    /// Unscoped events reach everyone; unscoped clients receive everything.
    pub fn accepts(&self, event: &ApiEvent) -> bool {
        match (self.store_id, event.store_id()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Clients whose channel accepted the event.
    pub delivered: usize,
    /// Clients removed because the write failed.
    pub removed: Vec<ConnectionId>,
}

struct Inner {
    clients: DashMap<ConnectionId, StreamClient>,
    config: StreamConfig,
}

/// The live set of stream clients.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct FanoutRegistry {
    inner: Arc<Inner>,
}

impl fmt::Debug for FanoutRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutRegistry")
            .field("clients", &self.inner.clients.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for FanoutRegistry {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

impl FanoutRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: DashMap::new(),
                config,
            }),
        }
    }

    /// Channel configuration for new clients.
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Adds a client. Fails if `id` is already registered.
    pub fn register(&self, id: ConnectionId, client: StreamClient) -> SseResult<()> {
        match self.inner.clients.entry(id) {
            Entry::Occupied(_) => return Err(SseError::DuplicateClient(id)),
            Entry::Vacant(slot) => {
                debug!(connection_id = %id, store_id = ?client.store_id, "stream client registered");
                slot.insert(client);
            }
        }
        metrics::set_stream_clients(self.len());
        Ok(())
    }

    /// Removes a client. Returns false if it was not registered.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.inner.clients.remove(id).is_some();
        if removed {
            debug!(connection_id = %id, "stream client unregistered");
            metrics::set_stream_clients(self.len());
        }
        removed
    }

    /// Opens a new client channel and registers it.
    ///
    /// `snapshot` events are queued ahead of any live event. The returned
    /// stream unregisters the client when dropped.
    pub fn connect(&self, store_id: Option<i64>, snapshot: &[ApiEvent]) -> SseResult<(ConnectionId, SseStream)> {
        let config = self
            .inner
            .config
            .clone()
            .with_buffer_size(self.inner.config.buffer_size.max(snapshot.len() + 1));
        let (sender, stream) = SseStream::channel(&config);
        for event in snapshot {
            sender.try_send(SseFrame::from_event(event)?.into())?;
        }

        let id = ConnectionId::new();
        let client = match store_id {
            Some(store_id) => StreamClient::for_store(sender, store_id),
            None => StreamClient::new(sender),
        };
        self.register(id, client)?;
        info!(connection_id = %id, store_id = ?store_id, snapshot = snapshot.len(), "stream client connected");

        let guard = ClientGuard {
            registry: self.clone(),
            id,
        };
        Ok((id, stream.with_guard(guard)))
    }

    /// Delivers `event` to every registered client.
    pub fn broadcast(&self, event: &ApiEvent) -> Delivery {
        self.fan_out(event, |_| true)
    }

    /// Delivers `event` to the clients following its store, plus unscoped
    /// clients. Events without a store reach everyone.
    pub fn publish_scoped(&self, event: &ApiEvent) -> Delivery {
        self.fan_out(event, |client| client.accepts(event))
    }

    /// Delivers `event` to one client.
    ///
    /// Returns false, without error, if the client is gone or the write
    /// failed. A failed write removes the client.
    pub fn send_to(&self, id: &ConnectionId, event: &ApiEvent) -> bool {
        let Some(item) = encode(event) else {
            return false;
        };
        let result = match self.inner.clients.get(id) {
            Some(client) => client.sender.try_send(item),
            None => return false,
        };
        match result {
            Ok(()) => {
                metrics::record_events_delivered(event.kind(), 1);
                true
            }
            Err(err) => {
                debug!(connection_id = %id, error = %err, "dropping stream client after failed write");
                self.drop_clients(&[*id]);
                false
            }
        }
    }

    /// Returns true if `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(id)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.inner.clients.len()
    }

    /// Returns true if no clients are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.clients.is_empty()
    }

    /// Registered connection ids.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.clients.iter().map(|entry| *entry.key()).collect()
    }

    /// Removes every client, ending their streams once drained.
    ///
    /// Used on shutdown so open streams do not hold connections past the
    /// grace period.
    pub fn disconnect_all(&self) -> usize {
        let ids = self.connection_ids();
        let removed = ids.iter().filter(|id| self.inner.clients.remove(*id).is_some()).count();
        if removed > 0 {
            info!(clients = removed, "disconnected all stream clients");
            metrics::set_stream_clients(self.len());
        }
        removed
    }

    fn fan_out(&self, event: &ApiEvent, select: impl Fn(&StreamClient) -> bool) -> Delivery {
        let Some(item) = encode(event) else {
            return Delivery::default();
        };

        let mut delivery = Delivery::default();
        // Shard read locks are held while iterating; removals wait until after.
        for entry in self.inner.clients.iter() {
            if !select(entry.value()) {
                continue;
            }
            match entry.value().sender.try_send(item.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => {
                    debug!(connection_id = %entry.key(), error = %err, "stream write failed");
                    delivery.removed.push(*entry.key());
                }
            }
        }

        self.drop_clients(&delivery.removed);
        metrics::record_events_delivered(event.kind(), delivery.delivered);
        delivery
    }

    fn drop_clients(&self, ids: &[ConnectionId]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            self.inner.clients.remove(id);
        }
        metrics::record_stream_clients_dropped(ids.len());
        metrics::set_stream_clients(self.len());
        info!(count = ids.len(), "removed unreachable stream clients");
    }
}

impl EventPublisher for FanoutRegistry {
    fn publish(&self, event: ApiEvent) {
        self.publish_scoped(&event);
    }
}

fn encode(event: &ApiEvent) -> Option<SseItem> {
    match SseFrame::from_event(event) {
        Ok(frame) => Some(frame.into()),
        Err(err) => {
            warn!(kind = event.kind(), error = %err, "event could not be encoded");
            None
        }
    }
}

/// Unregisters its client when dropped.
pub(crate) struct ClientGuard {
    registry: FanoutRegistry,
    id: ConnectionId,
}

impl fmt::Debug for ClientGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientGuard").field(&self.id).finish()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if self.registry.unregister(&self.id) {
            info!(connection_id = %self.id, "stream client disconnected");
        }
    }
}
