//! Contract handlers.
//!
//! A handler receives the [`RequestContext`] built by the dispatcher and
//! returns a [`Reply`]. It never sees the HTTP layer and never commits or
//! rolls back: returning `Err` is enough for the dispatcher to roll back.

use std::future::Future;
use std::pin::Pin;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::BackofficeResult;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Status override; the contract default is used when `None`.
    pub status: Option<StatusCode>,
    /// Payload wrapped as `{"data": ...}`; `None` yields the static or
    /// completion body.
    pub data: Option<Value>,
}

impl Reply {
    /// A payload with the default status.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self {
            status: None,
            data: Some(value),
        }
    }

    /// Serializes `value` as the payload.
    pub fn json<T: Serialize>(value: &T) -> BackofficeResult<Self> {
        Ok(Self::data(serde_json::to_value(value)?))
    }

    /// No payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Overrides the status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

/// Business logic behind one contract.
///
/// # Example
///
/// ```
/// use backoffice_core::{BoxFuture, BackofficeResult, ContractHandler, Reply, RequestContext};
///
/// struct Ping;
///
/// impl ContractHandler for Ping {
///     fn handle<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
///         Box::pin(async { Ok(Reply::data(serde_json::json!("pong"))) })
///     }
/// }
/// ```
pub trait ContractHandler: Send + Sync + 'static {
    /// Runs the contract against a validated, authorized request.
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_builders() {
        let reply = Reply::data(json!([1, 2])).with_status(StatusCode::CREATED);
        assert_eq!(reply.status, Some(StatusCode::CREATED));
        assert_eq!(reply.data, Some(json!([1, 2])));
        assert_eq!(Reply::empty().data, None);

        #[derive(Serialize)]
        struct Row {
            id: i64,
        }
        assert_eq!(Reply::json(&Row { id: 4 }).unwrap().data, Some(json!({ "id": 4 })));
    }
}
