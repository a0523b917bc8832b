//! HTTP server.
//!
//! A hyper HTTP/1.1 accept loop in front of the [`Dispatcher`]. Besides
//! contract routes it answers `GET /health`, `GET /ready` and, when
//! configured, the OpenAPI document path.
//!
//! On shutdown the listener closes first, readiness turns to 503, every
//! event stream is ended, and open connections get `shutdown_timeout` to
//! finish their in-flight requests.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use backoffice_config::ServerConfig;
use backoffice_core::BackofficeError;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchBody, DispatchRequest, Dispatched, Dispatcher};
use crate::error::{ServerError, ServerResult};
use crate::health::Probes;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Boxed error carried by response bodies.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Response body: a JSON document or an event stream.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// HTTP response produced by the server.
pub type HttpResponse = Response<ResponseBody>;

/// Path of the liveness probe.
pub const HEALTH_PATH: &str = "/health";

/// Path of the readiness probe.
pub const READY_PATH: &str = "/ready";

/// The back-office HTTP server.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    probes: Probes,
    docs: Option<(String, Bytes)>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("http_addr", &self.config.http_addr)
            .field("docs", &self.docs.as_ref().map(|(path, _)| path))
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server in front of `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>, config: ServerConfig) -> Self {
        Self {
            dispatcher,
            config,
            probes: Probes::new("backoffice"),
            docs: None,
        }
    }

    /// Sets the service name reported by `/health`.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.probes = Probes::new(name);
        self
    }

    /// Serves a pre-rendered OpenAPI document at `path`.
    #[must_use]
    pub fn with_docs(mut self, path: impl Into<String>, document: impl Into<Bytes>) -> Self {
        self.docs = Some((path.into(), document.into()));
        self
    }

    /// Liveness and readiness state.
    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    /// The dispatcher behind contract routes.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Binds the configured address and serves until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr: SocketAddr =
            self.config
                .http_addr
                .parse()
                .map_err(|e: std::net::AddrParseError| ServerError::InvalidAddress {
                    addr: self.config.http_addr.clone(),
                    reason: e.to_string(),
                })?;
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from `listener` until `shutdown` triggers.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        info!(addr = %listener.local_addr()?, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let token = tracker.acquire();
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.serve_connection(stream, shutdown).await {
                                debug!(remote = %remote, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                () = shutdown.recv() => break,
            }
        }
        drop(listener);

        server.probes.set_ready(false);
        let streams = server.dispatcher.fanout().disconnect_all();
        let timeout = server.config.shutdown_timeout();
        info!(
            connections = tracker.active_connections(),
            streams,
            timeout_secs = timeout.as_secs(),
            "draining connections"
        );

        if tokio::time::timeout(timeout, tracker.drained()).await.is_err() {
            warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }
        info!("server stopped");
        Ok(())
    }

    async fn serve_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let server = Arc::clone(self);
        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });

        let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Answers one request.
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if req.method() == Method::GET {
            let path = req.uri().path();
            if path == HEALTH_PATH {
                return json_response(StatusCode::OK, &self.probes.health());
            }
            if path == READY_PATH {
                let status = if self.probes.is_ready() {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                let clients = self.dispatcher.fanout().len();
                return json_response(status, &self.probes.readiness(clients));
            }
            if let Some((docs_path, document)) = &self.docs {
                if path == docs_path {
                    return with_content_type(
                        Response::new(full(document.clone())),
                        "application/json",
                    );
                }
            }
        }

        let (parts, body) = req.into_parts();
        let limited = Limited::new(body, self.config.max_body_bytes);
        let body = match tokio::time::timeout(self.config.request_timeout(), limited.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return plain_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    format!("request body exceeds {} bytes", self.config.max_body_bytes),
                );
            }
            Ok(Err(e)) => {
                debug!(error = %e, "failed to read request body");
                return plain_error(StatusCode::BAD_REQUEST, "BODY_READ_ERROR", "failed to read request body");
            }
            Err(_) => {
                return plain_error(StatusCode::REQUEST_TIMEOUT, "REQUEST_TIMEOUT", "request body timed out");
            }
        };

        let request = DispatchRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().unwrap_or_default().to_string(),
            headers: parts.headers,
            body,
        };
        match tokio::time::timeout(self.config.request_timeout(), self.dispatcher.dispatch(request)).await {
            Ok(dispatched) => into_response(dispatched),
            Err(_) => {
                warn!(timeout_ms = self.config.request_timeout_ms, "request timed out");
                let err = BackofficeError::external_unavailable("backoffice", "request timed out");
                json_response(err.status_code(), &err.to_envelope(None))
            }
        }
    }
}

fn full(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

fn with_content_type(mut response: HttpResponse, content_type: &'static str) -> HttpResponse {
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    with_content_type(response, "application/json")
}

/// Envelope for failures raised before dispatch. 400 keeps the `validation`
/// category; size and time limits are reported as `transport`.
fn plain_error(status: StatusCode, code: &str, message: impl Into<String>) -> HttpResponse {
    let message: String = message.into();
    let category = if status == StatusCode::BAD_REQUEST { "validation" } else { "transport" };
    json_response(
        status,
        &json!({ "error": { "code": code, "message": message, "category": category } }),
    )
}

fn into_response(dispatched: Dispatched) -> HttpResponse {
    let body = match dispatched.body {
        DispatchBody::Json(value) => full(serde_json::to_vec(&value).unwrap_or_default()),
        DispatchBody::Stream { stream, .. } => StreamBody::new(
            stream
                .map_ok(Frame::data)
                .map_err(|e| Box::new(e) as BoxError),
        )
        .boxed_unsync(),
    };
    let mut response = Response::new(body);
    *response.status_mut() = dispatched.status;
    *response.headers_mut() = dispatched.headers;
    response
}
