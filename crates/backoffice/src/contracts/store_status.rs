//! Per-store status stream.
//!
//! A subscriber first receives the store's current status, then every event
//! published for that store.
//!
//! The snapshot is read inside the request transaction and the client is
//! registered after commit. A status change committed by another request in
//! between is missed, and the client keeps the stale snapshot until the next
//! change is published.

use backoffice_core::{
    ApiEvent, BackofficeError, BackofficeResult, BoxFuture, ContractDefinition, ContractHandler,
    Reply, RequestContext, Role, Shape,
};
use serde_json::{json, Value};

/// Contract name.
pub const NAME: &str = "storeStatusStream";

/// `GET store/[store_id]/status/subscribe`
pub fn contract() -> BackofficeResult<ContractDefinition> {
    ContractDefinition::builder(NAME)
        .path("store/[store_id]/status/subscribe")
        .role(Role::Pos)
        .policy("store_access")
        .param("store_id", Shape::integer().required().min(1))
        .stream()
        .summary("Subscribe to store events")
        .description("Server-sent events scoped to one store, starting with its current status.")
        .tag("store")
        .build()
}

/// Status document of a store row.
fn status_of(store: &backoffice_core::Record) -> Value {
    json!({
        "is_active": store.get("is_active").cloned().unwrap_or(Value::Bool(false)),
        "opened": store.get("opened").cloned().unwrap_or(Value::Bool(false)),
        "display_name": store.get("display_name").cloned().unwrap_or(Value::Null),
    })
}

/// Handler for [`NAME`].
#[derive(Debug, Default)]
pub struct StoreStatusStream;

impl ContractHandler for StoreStatusStream {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
        Box::pin(async move {
            let resources = ctx.resources();
            let (Some(store_id), Some(store)) = (resources.store_id(), resources.store.as_ref()) else {
                return Err(BackofficeError::not_exist("store"));
            };
            ctx.push_snapshot(ApiEvent::StoreStatusChanged {
                store_id,
                status: status_of(store),
            });
            Ok(Reply::empty())
        })
    }
}
