//! Per-request context.
//!
//! A [`RequestContext`] is built once per call after validation and
//! authorization succeed. It owns the call's transaction; services and
//! handlers only ever borrow the context, so nothing built from it can outlive
//! the transaction. The dispatcher consumes it with
//! [`RequestContext::finish`] to commit or roll back exactly once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use uuid::Uuid;

use crate::contract::{ContractDefinition, RequestInput};
use crate::db::{Filter, Record, Transaction};
use crate::di::ServiceRegistry;
use crate::error::{BackofficeError, BackofficeResult};
use crate::event::ApiEvent;
use crate::identity::{CallerIdentity, Role};

/// Table holding stores.
pub const STORE_TABLE: &str = "store";

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps request ids sortable in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resources attached to the request by the context builder.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    /// The store named by the `store_id` path parameter.
    pub store: Option<Record>,
}

impl Resources {
    /// Id of the attached store.
    #[must_use]
    pub fn store_id(&self) -> Option<i64> {
        self.store.as_ref()?.get("id")?.as_i64()
    }

    /// Corporation owning the attached store.
    #[must_use]
    pub fn corporation_id(&self) -> Option<i64> {
        self.store.as_ref()?.get("corporation_id")?.as_i64()
    }
}

type Hook = Box<dyn FnOnce() + Send>;

/// Per-call bundle of identity, input, transaction and resources.
pub struct RequestContext {
    request_id: RequestId,
    contract: Arc<ContractDefinition>,
    caller: CallerIdentity,
    input: RequestInput,
    resources: Resources,
    services: Arc<ServiceRegistry>,
    tx: AsyncMutex<Box<dyn Transaction>>,
    pending_events: Mutex<Vec<ApiEvent>>,
    after_commit: Mutex<Vec<Hook>>,
    snapshot: Mutex<Vec<ApiEvent>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("contract", &self.contract.name())
            .field("caller", &self.caller.log_id())
            .field("store_id", &self.resources.store_id())
            .finish_non_exhaustive()
    }
}

/// Parts of a finished context, returned to the dispatcher.
pub struct FinishedContext {
    /// The transaction to commit or roll back.
    pub transaction: Box<dyn Transaction>,
    /// Events to publish after a successful commit.
    pub events: Vec<ApiEvent>,
    /// Hooks to run after a successful commit.
    pub after_commit: Vec<Box<dyn FnOnce() + Send>>,
    /// Snapshot events for a stream client, sent before live events.
    pub snapshot: Vec<ApiEvent>,
    /// Store the request was scoped to.
    pub store_id: Option<i64>,
}

impl fmt::Debug for FinishedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinishedContext")
            .field("events", &self.events.len())
            .field("after_commit", &self.after_commit.len())
            .field("snapshot", &self.snapshot.len())
            .field("store_id", &self.store_id)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Starts building a context.
    #[must_use]
    pub fn builder(contract: Arc<ContractDefinition>, input: RequestInput) -> ContextBuilder {
        ContextBuilder {
            request_id: RequestId::new(),
            contract,
            caller: CallerIdentity::Anonymous,
            input,
            services: Arc::new(ServiceRegistry::new()),
        }
    }

    /// Request id.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Contract being served.
    #[must_use]
    pub fn contract(&self) -> &ContractDefinition {
        &self.contract
    }

    /// Caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Caller role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.caller.role()
    }

    /// Validated input.
    #[must_use]
    pub fn input(&self) -> &RequestInput {
        &self.input
    }

    /// Attached resources.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Application-wide services.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Locks the request transaction.
    ///
    /// Hold the guard for one operation at a time; the lock is not reentrant.
    pub async fn tx(&self) -> MutexGuard<'_, Box<dyn Transaction>> {
        self.tx.lock().await
    }

    /// Queues an event for delivery once the transaction commits.
    /// Dropped if the request fails.
    pub fn publish_after_commit(&self, event: ApiEvent) {
        self.pending_events.lock().push(event);
    }

    /// Registers a hook to run once the transaction commits.
    pub fn after_commit(&self, hook: impl FnOnce() + Send + 'static) {
        self.after_commit.lock().push(Box::new(hook));
    }

    /// Queues a snapshot event for the stream client this request opens.
    pub fn push_snapshot(&self, event: ApiEvent) {
        self.snapshot.lock().push(event);
    }

    /// Consumes the context, handing its transaction and queues back.
    #[must_use]
    pub fn finish(self) -> FinishedContext {
        FinishedContext {
            store_id: self.resources.store_id(),
            transaction: self.tx.into_inner(),
            events: self.pending_events.into_inner(),
            after_commit: self.after_commit.into_inner(),
            snapshot: self.snapshot.into_inner(),
        }
    }
}

/// Builder for [`RequestContext`].
#[must_use]
pub struct ContextBuilder {
    request_id: RequestId,
    contract: Arc<ContractDefinition>,
    caller: CallerIdentity,
    input: RequestInput,
    services: Arc<ServiceRegistry>,
}

impl ContextBuilder {
    /// Uses an existing request id.
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    /// Sets the caller.
    pub fn caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Sets the application services.
    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = services;
        self
    }

    /// Opens the context over `tx`.
    ///
    /// When the path carries `store_id`, the store row is loaded through
    /// `tx`; a missing or inactive store is [`BackofficeError::NotExist`].
    /// On error the transaction is handed back so the caller can roll it back.
    pub async fn build(
        self,
        mut tx: Box<dyn Transaction>,
    ) -> Result<RequestContext, (BackofficeError, Box<dyn Transaction>)> {
        let mut resources = Resources::default();

        if let Some(raw) = self.input.params.get("store_id") {
            match load_store(tx.as_mut(), raw).await {
                Ok(store) => resources.store = Some(store),
                Err(err) => return Err((err, tx)),
            }
        }

        Ok(RequestContext {
            request_id: self.request_id,
            contract: self.contract,
            caller: self.caller,
            input: self.input,
            resources,
            services: self.services,
            tx: AsyncMutex::new(tx),
            pending_events: Mutex::new(Vec::new()),
            after_commit: Mutex::new(Vec::new()),
            snapshot: Mutex::new(Vec::new()),
        })
    }
}

async fn load_store(tx: &mut dyn Transaction, raw: &Value) -> BackofficeResult<Record> {
    let not_exist = || BackofficeError::not_exist_resource("store", raw_id(raw));
    let id = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(not_exist)?;

    let store = tx
        .find_first(STORE_TABLE, &Filter::new().eq("id", id))
        .await?
        .ok_or_else(not_exist)?;

    if store.get("is_active").and_then(Value::as_bool) == Some(false) {
        return Err(not_exist());
    }
    Ok(store)
}

fn raw_id(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::memory::MemoryDatabase;
    use crate::schema::Shape;
    use serde_json::json;

    fn contract() -> Arc<ContractDefinition> {
        Arc::new(
            ContractDefinition::builder("getStore")
                .path("store/[store_id]")
                .role(crate::Role::Pos)
                .param("store_id", Shape::integer().required())
                .build()
                .unwrap(),
        )
    }

    fn input(store_id: i64) -> RequestInput {
        let mut input = RequestInput::default();
        input.params.insert("store_id".to_string(), json!(store_id));
        input
    }

    async fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.seed(
            STORE_TABLE,
            [
                json!({ "id": 1, "corporation_id": 7, "is_active": true }),
                json!({ "id": 2, "corporation_id": 7, "is_active": false }),
            ]
            .into_iter()
            .filter_map(|v| v.as_object().cloned()),
        )
        .await;
        db
    }

    #[tokio::test]
    async fn test_loads_store_resource() {
        let db = seeded().await;
        let ctx = RequestContext::builder(contract(), input(1))
            .build(db.begin().await.unwrap())
            .await
            .unwrap();

        assert_eq!(ctx.resources().store_id(), Some(1));
        assert_eq!(ctx.resources().corporation_id(), Some(7));
        assert_eq!(ctx.role(), Role::Everyone);
    }

    #[tokio::test]
    async fn test_missing_or_inactive_store_is_not_exist() {
        let db = seeded().await;
        for id in [2, 99] {
            let (err, tx) = RequestContext::builder(contract(), input(id))
                .build(db.begin().await.unwrap())
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
            tx.rollback().await.unwrap();
        }
        assert_eq!(db.rollbacks(), 2);
    }

    #[tokio::test]
    async fn test_finish_returns_queues() {
        let db = seeded().await;
        let ctx = RequestContext::builder(contract(), input(1))
            .build(db.begin().await.unwrap())
            .await
            .unwrap();

        ctx.publish_after_commit(ApiEvent::AnnouncementRead {
            store_id: 1,
            announcement_id: 4,
        });
        ctx.push_snapshot(ApiEvent::StoreStatusChanged {
            store_id: 1,
            status: json!({ "open": true }),
        });
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        ctx.after_commit(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));

        let finished = ctx.finish();
        assert_eq!(finished.events.len(), 1);
        assert_eq!(finished.snapshot.len(), 1);
        assert_eq!(finished.store_id, Some(1));
        finished.transaction.commit().await.unwrap();
        for hook in finished.after_commit {
            hook();
        }
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
