//! Manual trigger for the daily aggregation of one store.

use backoffice_core::{
    BackofficeError, BackofficeResult, BoxFuture, ContractDefinition, ContractHandler, Reply,
    RequestContext, Role, Shape, TaskStatus,
};
use backoffice_tasks::{progress_event, JobKey, JobRunner};
use chrono::{NaiveDate, Utc};
use http::Method;
use serde::Deserialize;
use serde_json::json;

/// Contract name.
pub const NAME: &str = "dailyCalculate";

/// `POST store/[store_id]/daily-calculate`, bot only.
pub fn contract() -> BackofficeResult<ContractDefinition> {
    ContractDefinition::builder(NAME)
        .method(Method::POST)
        .path("store/[store_id]/daily-calculate")
        .role(Role::Bot)
        .param("store_id", Shape::integer().required().min(1))
        .body(Shape::object([(
            "target_day",
            Shape::string()
                .min_len(10)
                .max_len(10)
                .describe("YYYY-MM-DD; defaults to yesterday (UTC)"),
        )]))
        .summary("Recompute the daily aggregates of one store")
        .tag("batch")
        .build()
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    target_day: Option<String>,
}

/// Handler for [`NAME`].
///
/// Runs inside the request transaction, so a failing job leaves nothing
/// behind. The [`JobRunner`] comes from the service registry.
#[derive(Debug, Default)]
pub struct DailyCalculate;

impl ContractHandler for DailyCalculate {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
        Box::pin(async move {
            let store_id = ctx
                .resources()
                .store_id()
                .ok_or_else(|| BackofficeError::not_exist("store"))?;
            let body: Body = if ctx.input().body.is_null() {
                Body::default()
            } else {
                ctx.input().body_as()?
            };

            let key = match body.target_day.as_deref() {
                Some(day) => {
                    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| {
                        BackofficeError::invalid_field("body.target_day", "must be a date (YYYY-MM-DD)")
                    })?;
                    JobKey::new(store_id, day)
                }
                None => JobKey::yesterday(store_id, Utc::now()),
            };

            let runner = ctx.services().require::<JobRunner>()?;
            let report = {
                let mut tx = ctx.tx().await;
                runner.run_in(&mut **tx, key).await?
            };
            ctx.publish_after_commit(progress_event(
                key,
                TaskStatus::Succeeded,
                json!({ "jobs": &report.jobs }),
            ));
            Reply::json(&report)
        })
    }
}
