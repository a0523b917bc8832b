//! Announcement read receipts.

use backoffice_core::service::{ScopeMode, Scoped};
use backoffice_core::{
    ApiEvent, BackofficeError, BackofficeResult, BoxFuture, ContractDefinition, ContractHandler,
    Filter, Record, Reply, RequestContext, Role, Service, ServiceIds, Shape,
};
use http::Method;
use serde_json::{json, Value};
use tracing::debug;

/// Announcements published to stores.
pub const ANNOUNCEMENT_TABLE: &str = "announcement";
/// One read receipt per `(announcement_id, store_id)`.
pub const READ_TABLE: &str = "announcement_store";

/// Contract name.
pub const NAME: &str = "readAnnouncement";

/// `POST store/[store_id]/announcement/[id]/read`
pub fn contract() -> BackofficeResult<ContractDefinition> {
    ContractDefinition::builder(NAME)
        .method(Method::POST)
        .path("store/[store_id]/announcement/[id]/read")
        .role(Role::Pos)
        .policy("store_access")
        .param("store_id", Shape::integer().required().min(1))
        .param("id", Shape::integer().required().min(1))
        .response(
            200,
            Shape::object([
                ("announcement_id", Shape::integer().required()),
                ("store_id", Shape::integer().required()),
                ("read", Shape::boolean().required()),
            ]),
        )
        .summary("Mark an announcement as read")
        .tag("announcement")
        .build()
}

/// Read-receipt logic, scoped to one store.
#[derive(Debug, Default)]
pub struct ReadReceipts {
    ids: ServiceIds,
}

impl Scoped for ReadReceipts {
    fn apply_ids(&mut self, ids: &ServiceIds, mode: ScopeMode) {
        self.ids.apply_ids(ids, mode);
    }
}

impl ReadReceipts {
    /// Marks `announcement_id` as read by the scoped store.
    ///
    /// Repeating the call leaves one receipt with `read = true`.
    pub async fn mark_read(&self, ctx: &RequestContext, announcement_id: i64) -> BackofficeResult<Record> {
        let store_id = self.ids.require("store_id")?;
        let mut tx = ctx.tx().await;

        if tx
            .find_first(ANNOUNCEMENT_TABLE, &Filter::new().eq("id", announcement_id))
            .await?
            .is_none()
        {
            return Err(BackofficeError::not_exist_resource(
                "announcement",
                announcement_id.to_string(),
            ));
        }

        let mut read = Record::new();
        read.insert("read".to_string(), Value::Bool(true));
        let key = Filter::new()
            .eq("announcement_id", announcement_id)
            .eq("store_id", store_id);
        let row = tx.upsert(READ_TABLE, &key, read.clone(), read).await?;
        debug!(store_id, announcement_id, "announcement marked read");
        Ok(row)
    }
}

/// Handler for [`NAME`].
#[derive(Debug, Default)]
pub struct ReadAnnouncement;

impl ContractHandler for ReadAnnouncement {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
        Box::pin(async move {
            let announcement_id = ctx.input().param_i64("id")?;
            let service = Service::new(ctx, ReadReceipts::default());
            let store_id = service.store_id()?;

            service.core().mark_read(ctx, announcement_id).await?;
            ctx.publish_after_commit(ApiEvent::AnnouncementRead {
                store_id,
                announcement_id,
            });

            Ok(Reply::data(json!({
                "announcement_id": announcement_id,
                "store_id": store_id,
                "read": true,
            })))
        })
    }
}
