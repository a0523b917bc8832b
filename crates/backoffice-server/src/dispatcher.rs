//! The contract dispatcher.
//!
//! Every call goes through the same pipeline:
//!
//! 1. resolve `(method, path)` to a contract (404 / 405)
//! 2. validate params, query and body against the contract's shapes (400,
//!    every failing field listed)
//! 3. resolve the caller and authorize roles then policies (403, the handler
//!    never runs)
//! 4. open a transaction and build the request context (404 for a missing
//!    store)
//! 5. run the handler and shape its reply
//! 6. commit, then run after-commit hooks and publish queued events
//!
//! Any error after step 4 rolls the transaction back before the response is
//! rendered. The dispatcher is the only place errors become responses.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use backoffice_authz::{Authorizer, Decision};
use backoffice_core::{
    BackofficeError, BackofficeResult, ContractDefinition, ContractRegistry, Database,
    ErrorCategory, FieldErrors, IdentityResolver, RawRequest, RequestContext, RequestId,
    Resolution, ServiceRegistry, StaticSessions, Transaction,
};
use backoffice_sse::{stream_headers, ConnectionId, FanoutRegistry, SseStream};
use backoffice_telemetry::metrics;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use crate::error::{ServerError, ServerResult};
use crate::handler::HandlerRegistry;

/// Header carrying the request id on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// One inbound call, detached from the HTTP connection.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Raw query string without `?`.
    pub query: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl DispatchRequest {
    /// A request with no query, headers or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets the query string.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Adds a header. Invalid values are ignored.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {token}"))
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.body = serde_json::to_vec(value).map(Bytes::from).unwrap_or_default();
        self.header("content-type", "application/json")
    }
}

/// Body of a dispatched response.
pub enum DispatchBody {
    /// A JSON document.
    Json(Value),
    /// An open event stream.
    Stream {
        /// Registry id of the new client.
        connection: ConnectionId,
        /// Encoded event frames.
        stream: SseStream,
    },
}

impl fmt::Debug for DispatchBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream { connection, .. } => f
                .debug_struct("Stream")
                .field("connection", connection)
                .finish_non_exhaustive(),
        }
    }
}

/// A rendered response.
#[derive(Debug)]
pub struct Dispatched {
    /// Request id, also in the `x-request-id` header.
    pub request_id: RequestId,
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: DispatchBody,
}

impl Dispatched {
    fn json(request_id: RequestId, status: StatusCode, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::with_request_id(request_id, status, headers, DispatchBody::Json(body))
    }

    fn error(request_id: RequestId, err: &BackofficeError, contract: Option<&ContractDefinition>) -> Self {
        let rid = request_id.to_string();
        let (status, envelope) = match contract {
            Some(contract) => contract.render_error(err, Some(&rid)),
            None => (err.status_code(), err.to_envelope(Some(&rid))),
        };
        let body = serde_json::to_value(&envelope).unwrap_or_else(|_| {
            json!({ "error": { "code": "UNKNOWN_ERROR", "category": "unknown" } })
        });
        Self::json(request_id, status, body)
    }

    fn with_request_id(
        request_id: RequestId,
        status: StatusCode,
        mut headers: HeaderMap,
        body: DispatchBody,
    ) -> Self {
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        Self {
            request_id,
            status,
            headers,
            body,
        }
    }

    /// The JSON body, if this is not a stream.
    #[must_use]
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            DispatchBody::Json(value) => Some(value),
            DispatchBody::Stream { .. } => None,
        }
    }

    /// Returns true for an event stream.
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self.body, DispatchBody::Stream { .. })
    }
}

/// Validates, authorizes and runs contract calls.
pub struct Dispatcher {
    contracts: Arc<ContractRegistry>,
    handlers: HandlerRegistry,
    authorizer: Authorizer,
    identity: IdentityResolver,
    database: Arc<dyn Database>,
    services: Arc<ServiceRegistry>,
    fanout: FanoutRegistry,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("contracts", &self.contracts.len())
            .field("handlers", &self.handlers)
            .field("identity", &self.identity)
            .field("fanout", &self.fanout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Starts building a dispatcher over `contracts`.
    pub fn builder(contracts: Arc<ContractRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            contracts,
            handlers: HandlerRegistry::new(),
            authorizer: Authorizer::default(),
            identity: None,
            database: None,
            services: None,
            fanout: None,
        }
    }

    /// The contract table.
    #[must_use]
    pub fn contracts(&self) -> &Arc<ContractRegistry> {
        &self.contracts
    }

    /// The fan-out registry stream contracts connect to.
    #[must_use]
    pub fn fanout(&self) -> &FanoutRegistry {
        &self.fanout
    }

    /// Services handed to every request context.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Serves one call. Never fails; errors are rendered into the response.
    pub async fn dispatch(&self, request: DispatchRequest) -> Dispatched {
        let request_id = RequestId::new();
        let span = info_span!(
            "request",
            request_id = %request_id,
            http.method = %request.method,
            http.path = %request.path,
            contract = field::Empty,
        );
        self.dispatch_inner(request, request_id).instrument(span).await
    }

    async fn dispatch_inner(&self, request: DispatchRequest, request_id: RequestId) -> Dispatched {
        let started = Instant::now();

        let (contract, params) = match self.contracts.resolve(&request.method, &request.path) {
            Resolution::Found(contract, params) => (contract, params),
            Resolution::MethodNotAllowed(allowed) => {
                debug!(allowed = ?allowed, "method not allowed");
                return method_not_allowed(request_id, &request.method, &allowed);
            }
            Resolution::NotFound => {
                debug!("no contract matches");
                let err = BackofficeError::not_exist(format!(
                    "no contract serves {} {}",
                    request.method, request.path
                ));
                return Dispatched::error(request_id, &err, None);
            }
        };
        Span::current().record("contract", contract.name());
        let _in_flight = metrics::InFlightGuard::new();

        let raw = RawRequest {
            params: &params,
            query: &request.query,
            body: &request.body,
        };
        let dispatched = match self.serve(&contract, raw, &request.headers, request_id).await {
            Ok(dispatched) => dispatched,
            Err(err) => {
                log_failure(&err);
                Dispatched::error(request_id, &err, Some(&contract))
            }
        };

        let elapsed = started.elapsed();
        metrics::record_request(contract.name(), dispatched.status.as_u16(), elapsed);
        info!(
            http.status_code = dispatched.status.as_u16(),
            duration_ms = elapsed.as_millis() as u64,
            stream = dispatched.is_stream(),
            "request completed"
        );
        dispatched
    }

    async fn serve(
        &self,
        contract: &Arc<ContractDefinition>,
        raw: RawRequest<'_>,
        headers: &HeaderMap,
        request_id: RequestId,
    ) -> BackofficeResult<Dispatched> {
        let input = contract.parse_request(raw).map_err(|err| {
            if let Some(fields) = err.field_errors() {
                record_validation(fields);
            }
            err
        })?;

        let caller = self.identity.resolve(headers).await?;
        let decision = self.authorizer.authorize(contract, &caller, &input.params);
        metrics::record_authz_decision(
            decision.is_allowed(),
            decision.reason().map_or("allowed", |r| r.label()),
        );
        if let Decision::Deny(reason) = decision {
            return Err(BackofficeError::permission_for_contract(
                reason.to_string(),
                contract.name(),
            ));
        }

        let handler = self.handlers.get(contract.name()).ok_or_else(|| {
            BackofficeError::unknown(format!("no handler for contract '{}'", contract.name()))
        })?;

        let tx = self.database.begin().await?;
        let ctx = match RequestContext::builder(Arc::clone(contract), input)
            .request_id(request_id)
            .caller(caller)
            .services(Arc::clone(&self.services))
            .build(tx)
            .await
        {
            Ok(ctx) => ctx,
            Err((err, tx)) => {
                rollback(tx).await;
                return Err(err);
            }
        };

        let result = handler.handle(&ctx).await;
        let finished = ctx.finish();

        let shaped = match result {
            Ok(_) if contract.is_stream() => Ok(None),
            Ok(reply) => contract.shape_response(reply).map(Some),
            Err(err) => Err(err),
        };
        let shaped = match shaped {
            Ok(shaped) => shaped,
            Err(err) => {
                rollback(finished.transaction).await;
                return Err(err);
            }
        };

        finished.transaction.commit().await?;
        debug!(events = finished.events.len(), "transaction committed");
        for hook in finished.after_commit {
            hook();
        }
        for event in &finished.events {
            self.fanout.publish_scoped(event);
        }

        match shaped {
            Some((status, body)) => Ok(Dispatched::json(request_id, status, body)),
            None => {
                let (connection, stream) = self.fanout.connect(finished.store_id, &finished.snapshot)?;
                Ok(Dispatched::with_request_id(
                    request_id,
                    StatusCode::OK,
                    stream_headers(),
                    DispatchBody::Stream { connection, stream },
                ))
            }
        }
    }
}

/// Builder for [`Dispatcher`].
#[must_use]
pub struct DispatcherBuilder {
    contracts: Arc<ContractRegistry>,
    handlers: HandlerRegistry,
    authorizer: Authorizer,
    identity: Option<IdentityResolver>,
    database: Option<Arc<dyn Database>>,
    services: Option<Arc<ServiceRegistry>>,
    fanout: Option<FanoutRegistry>,
}

impl DispatcherBuilder {
    /// Sets the handlers.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Sets the authorizer. Defaults to built-in policies only.
    pub fn authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Sets the identity resolver. Defaults to anonymous-only.
    pub fn identity(mut self, identity: IdentityResolver) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Sets the database. Required.
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the application services handed to every context.
    pub fn services(mut self, services: Arc<ServiceRegistry>) -> Self {
        self.services = Some(services);
        self
    }

    /// Sets the fan-out registry.
    pub fn fanout(mut self, fanout: FanoutRegistry) -> Self {
        self.fanout = Some(fanout);
        self
    }

    /// Checks handlers and policies against the contracts and builds.
    pub fn build(self) -> ServerResult<Dispatcher> {
        let database = self.database.ok_or(ServerError::MissingDatabase)?;
        self.handlers.verify(&self.contracts)?;
        self.authorizer.verify(&self.contracts)?;

        Ok(Dispatcher {
            contracts: self.contracts,
            handlers: self.handlers,
            authorizer: self.authorizer,
            identity: self
                .identity
                .unwrap_or_else(|| IdentityResolver::new(None, None, Arc::new(StaticSessions::new()))),
            database,
            services: self.services.unwrap_or_default(),
            fanout: self.fanout.unwrap_or_default(),
        })
    }
}

async fn rollback(tx: Box<dyn Transaction>) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

fn log_failure(err: &BackofficeError) {
    match err.category() {
        ErrorCategory::Unknown | ErrorCategory::ExternalService | ErrorCategory::Declared => {
            error!(error = %err, source = ?std::error::Error::source(err), "request failed");
        }
        category => debug!(error = %err, category = ?category, "request rejected"),
    }
}

fn record_validation(fields: &FieldErrors) {
    let mut per_location: BTreeMap<&str, usize> = BTreeMap::new();
    for path in fields.paths() {
        let location = path.split(['.', '[']).next().unwrap_or(path);
        *per_location.entry(location).or_default() += 1;
    }
    for (location, count) in per_location {
        metrics::record_validation_failure(location, count);
    }
}

fn method_not_allowed(request_id: RequestId, method: &Method, allowed: &[Method]) -> Dispatched {
    let allowed: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    let body = json!({
        "error": {
            "code": "METHOD_NOT_ALLOWED",
            "message": format!("method {method} is not allowed here"),
            "category": "not_exist",
            "details": { "allowed": allowed },
        },
        "request_id": request_id.to_string(),
    });
    let mut dispatched = Dispatched::json(request_id, StatusCode::METHOD_NOT_ALLOWED, body);
    if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
        dispatched.headers.insert(header::ALLOW, value);
    }
    dispatched
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::{
        ApiEvent, BoxFuture, ContractHandler, MemoryDatabase, PosSession, Record, Reply,
        Role, Shape,
    };
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const POS_TOKEN: &str = "pos-session";

    /// Inserts a row, queues an event and counts calls.
    struct Insert {
        calls: Arc<AtomicUsize>,
        fail_with: Option<fn() -> BackofficeError>,
    }

    impl ContractHandler for Insert {
        fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let store_id = ctx.resources().store_id().unwrap_or_default();
                let mut row = Record::new();
                row.insert("store_id".to_string(), json!(store_id));
                row.insert("name".to_string(), ctx.input().body["name"].clone());
                ctx.tx().await.create("note", row).await?;
                ctx.publish_after_commit(ApiEvent::GenericMessage {
                    store_id: Some(store_id),
                    message: "note created".to_string(),
                    data: Value::Null,
                });
                if let Some(fail) = self.fail_with {
                    return Err(fail());
                }
                Ok(Reply::data(json!({ "store_id": store_id })).with_status(StatusCode::CREATED))
            })
        }
    }

    struct Snapshot;

    impl ContractHandler for Snapshot {
        fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
            Box::pin(async move {
                let store_id = ctx.resources().store_id().unwrap_or_default();
                ctx.push_snapshot(ApiEvent::StoreStatusChanged {
                    store_id,
                    status: json!({ "open": true }),
                });
                Ok(Reply::empty())
            })
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        db: MemoryDatabase,
        calls: Arc<AtomicUsize>,
    }

    async fn fixture(fail_with: Option<fn() -> BackofficeError>) -> Fixture {
        let mut contracts = ContractRegistry::new();
        contracts
            .register(
                ContractDefinition::builder("createNote")
                    .method(Method::POST)
                    .path("store/[store_id]/note")
                    .role(Role::Pos)
                    .policy("store_access")
                    .param("store_id", Shape::integer().required())
                    .body(Shape::object([
                        ("name", Shape::string().required().min_len(1)),
                        ("pinned", Shape::boolean().required()),
                    ]))
                    .response(201, Shape::object([("store_id", Shape::integer().required())]))
                    .error("noteLocked", 423, "The note board is locked")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        contracts
            .register(
                ContractDefinition::builder("storeStream")
                    .path("store/[store_id]/stream")
                    .role(Role::Pos)
                    .param("store_id", Shape::integer().required())
                    .stream()
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut handlers = HandlerRegistry::new();
        handlers
            .register(
                "createNote",
                Insert {
                    calls: Arc::clone(&calls),
                    fail_with,
                },
            )
            .unwrap();
        handlers.register("storeStream", Snapshot).unwrap();

        let db = MemoryDatabase::new();
        db.seed(
            "store",
            [json!({ "id": 1, "corporation_id": 1, "is_active": true })]
                .into_iter()
                .filter_map(|v| v.as_object().cloned()),
        )
        .await;

        let sessions = Arc::new(StaticSessions::new());
        sessions.insert(POS_TOKEN, PosSession::new(10, 1).with_store(1));

        let dispatcher = Dispatcher::builder(Arc::new(contracts))
            .handlers(handlers)
            .identity(IdentityResolver::new(Some("bot".to_string()), None, sessions))
            .database(Arc::new(db.clone()))
            .fanout(FanoutRegistry::new(
                backoffice_sse::StreamConfig::new().without_keep_alive().without_retry(),
            ))
            .build()
            .unwrap();

        Fixture { dispatcher, db, calls }
    }

    fn create(store_id: i64, body: &Value) -> DispatchRequest {
        DispatchRequest::new(Method::POST, format!("/store/{store_id}/note"))
            .bearer(POS_TOKEN)
            .json(body)
    }

    #[tokio::test]
    async fn test_success_commits_and_publishes() {
        let f = fixture(None).await;
        let (_id, mut stream) = f.dispatcher.fanout().connect(Some(1), &[]).unwrap();

        let out = f
            .dispatcher
            .dispatch(create(1, &json!({ "name": "restock", "pinned": false })))
            .await;

        assert_eq!(out.status, StatusCode::CREATED);
        assert_eq!(out.json_body(), Some(&json!({ "data": { "store_id": 1 } })));
        assert!(out.headers.contains_key(REQUEST_ID_HEADER));
        assert_eq!(f.db.rows("note").await.len(), 1);
        assert_eq!(f.db.commits(), 1);

        let frame = stream.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&frame).contains("note created"));
    }

    #[tokio::test]
    async fn test_validation_lists_every_field_without_transaction() {
        let f = fixture(None).await;
        let out = f.dispatcher.dispatch(create(1, &json!({}))).await;

        assert_eq!(out.status, StatusCode::BAD_REQUEST);
        let fields = &out.json_body().unwrap()["error"]["details"]["fields"];
        assert!(fields.get("body.name").is_some());
        assert!(fields.get("body.pinned").is_some());
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.db.commits(), 0);
        assert_eq!(f.db.rollbacks(), 0);
    }

    #[tokio::test]
    async fn test_wrong_role_never_runs_handler() {
        let f = fixture(None).await;
        let request = DispatchRequest::new(Method::POST, "/store/1/note")
            .header("bottoken", "bot")
            .json(&json!({ "name": "x", "pinned": true }));
        let out = f.dispatcher.dispatch(request).await;

        assert_eq!(out.status, StatusCode::FORBIDDEN);
        assert_eq!(out.json_body().unwrap()["error"]["code"], "PERMISSION_ERROR");
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.db.commits(), 0);
    }

    #[tokio::test]
    async fn test_store_policy_denies_foreign_store() {
        let f = fixture(None).await;
        let out = f
            .dispatcher
            .dispatch(create(2, &json!({ "name": "x", "pinned": true })))
            .await;
        assert_eq!(out.status, StatusCode::FORBIDDEN);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_rolls_back() {
        let f = fixture(Some(|| BackofficeError::conflict("note already exists"))).await;
        let out = f
            .dispatcher
            .dispatch(create(1, &json!({ "name": "x", "pinned": true })))
            .await;

        assert_eq!(out.status, StatusCode::CONFLICT);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
        assert!(f.db.rows("note").await.is_empty());
        assert_eq!(f.db.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_declared_error_uses_contract_status() {
        let f = fixture(Some(|| BackofficeError::declared("noteLocked"))).await;
        let out = f
            .dispatcher
            .dispatch(create(1, &json!({ "name": "x", "pinned": true })))
            .await;

        assert_eq!(out.status.as_u16(), 423);
        assert_eq!(out.json_body().unwrap()["error"]["message"], "The note board is locked");
        assert!(f.db.rows("note").await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_error_is_redacted() {
        let f = fixture(Some(|| BackofficeError::unknown("connection string postgres://secret"))).await;
        let out = f
            .dispatcher
            .dispatch(create(1, &json!({ "name": "x", "pinned": true })))
            .await;

        assert_eq!(out.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = out.json_body().unwrap().to_string();
        assert!(!body.contains("secret"));
    }

    #[tokio::test]
    async fn test_missing_store_is_not_found() {
        let db = MemoryDatabase::new();
        let sessions = Arc::new(StaticSessions::new());
        sessions.insert("linked", PosSession::new(11, 1).with_store(99));

        let mut contracts = ContractRegistry::new();
        contracts
            .register(
                ContractDefinition::builder("getStore")
                    .path("store/[store_id]")
                    .role(Role::Pos)
                    .policy("store_access")
                    .param("store_id", Shape::integer().required())
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let mut handlers = HandlerRegistry::new();
        handlers.register("getStore", Snapshot).unwrap();
        let dispatcher = Dispatcher::builder(Arc::new(contracts))
            .handlers(handlers)
            .identity(IdentityResolver::new(None, None, sessions))
            .database(Arc::new(db.clone()))
            .build()
            .unwrap();

        let out = dispatcher
            .dispatch(DispatchRequest::new(Method::GET, "/store/99").bearer("linked"))
            .await;
        assert_eq!(out.status, StatusCode::NOT_FOUND);
        assert_eq!(out.json_body().unwrap()["error"]["code"], "NOT_EXIST_ERROR");
        assert_eq!(db.commits(), 0);
        assert_eq!(db.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_stream_contract_opens_client_with_snapshot() {
        let f = fixture(None).await;
        let out = f
            .dispatcher
            .dispatch(DispatchRequest::new(Method::GET, "/store/1/stream").bearer(POS_TOKEN))
            .await;

        assert_eq!(out.status, StatusCode::OK);
        assert_eq!(
            out.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        let DispatchBody::Stream { connection, mut stream } = out.body else {
            panic!("expected a stream");
        };
        assert!(f.dispatcher.fanout().contains(&connection));

        let first = stream.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("store_status_changed"));

        drop(stream);
        assert!(!f.dispatcher.fanout().contains(&connection));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let f = fixture(None).await;
        let out = f.dispatcher.dispatch(DispatchRequest::new(Method::GET, "/nowhere")).await;
        assert_eq!(out.status, StatusCode::NOT_FOUND);

        let out = f.dispatcher.dispatch(DispatchRequest::new(Method::DELETE, "/store/1/note")).await;
        assert_eq!(out.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(out.headers.get(header::ALLOW).unwrap(), "POST");
    }

    #[tokio::test]
    async fn test_build_requires_database_and_handlers() {
        let contracts = Arc::new(ContractRegistry::new());
        let err = Dispatcher::builder(Arc::clone(&contracts)).build().unwrap_err();
        assert!(matches!(err, ServerError::MissingDatabase));

        let mut registry = ContractRegistry::new();
        registry
            .register(
                ContractDefinition::builder("orphan")
                    .path("orphan")
                    .role(Role::Everyone)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let err = Dispatcher::builder(Arc::new(registry))
            .database(Arc::new(MemoryDatabase::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::MissingHandler(_)));
    }

    #[test]
    fn test_validation_metrics_without_recorder() {
        let mut fields = FieldErrors::new();
        fields.add("body.items[2].price", "must be a number");
        fields.add("body.name", "is required");
        fields.add("params.store_id", "must be an integer");
        // No recorder installed; this must not panic.
        record_validation(&fields);
    }
}
