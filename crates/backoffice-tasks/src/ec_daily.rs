//! Daily EC order aggregation.
//!
//! Source tables:
//!
//! - `ec_setting`: `store_id`, `commission_rate` (percent)
//! - `ec_order_cart_store`: `id`, `order_id`, `store_id`, `status`
//!   (`completed` | `canceled`), `finished_at` (RFC 3339), `total_price`,
//!   `shipping_fee`, `payment_method`
//! - `ec_order_cart_store_product`: `id`, `order_cart_store_id`,
//!   `product_id`, `item_count`, `original_item_count`, `total_unit_price`,
//!   `wholesale_total_price`
//!
//! Output tables, both scoped by `(store_id, target_day)`:
//!
//! - `fact_ec_order_product`: one row per line of a completed order, keyed
//!   by `cart_id`
//! - `summary_daily_ec_order`: one row per key
//!
//! A store without an `ec_setting` row does not sell online; its key ends up
//! with no rows at all.

use std::collections::HashMap;

use async_trait::async_trait;
use backoffice_core::{BackofficeResult, Filter, Record, Transaction};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::job::{int, replace_rows, timestamp, AggregationJob, JobKey, JobOutput};

/// Per-store EC settings.
pub const SETTING_TABLE: &str = "ec_setting";
/// One store's share of an EC order.
pub const ORDER_TABLE: &str = "ec_order_cart_store";
/// Lines of [`ORDER_TABLE`].
pub const ORDER_LINE_TABLE: &str = "ec_order_cart_store_product";
/// Per-line fact output.
pub const FACT_TABLE: &str = "fact_ec_order_product";
/// Daily summary output.
pub const SUMMARY_TABLE: &str = "summary_daily_ec_order";

/// Order status counted as a sale.
pub const COMPLETED: &str = "completed";
/// Order status counted as a cancellation.
pub const CANCELED: &str = "canceled";

#[derive(Debug, Default, Serialize)]
struct Summary {
    price: i64,
    shipping_fee: i64,
    commission_price: i64,
    completed_count: i64,
    canceled_count: i64,
    change_count: i64,
    cancel_price: i64,
    change_price: i64,
    item_count: i64,
    wholesale_price: i64,
}

impl Summary {
    fn into_record(self, key: &JobKey) -> Record {
        let mut row = key.record();
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            row.extend(fields);
        }
        row
    }
}

/// Commission on goods sold, shipping excluded, rounded half away from zero.
fn commission(price: i64, shipping_fee: i64, rate_percent: f64) -> i64 {
    ((price - shipping_fee) as f64 * rate_percent / 100.0).round() as i64
}

/// The `ec_daily` job.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcDaily;

#[async_trait]
impl AggregationJob for EcDaily {
    fn name(&self) -> &'static str {
        "ec_daily"
    }

    async fn compute(&self, tx: &mut dyn Transaction, key: &JobKey) -> BackofficeResult<JobOutput> {
        let scope = key.scope();
        let setting = tx
            .find_first(SETTING_TABLE, &Filter::new().eq("store_id", key.store_id))
            .await?;
        let Some(setting) = setting else {
            debug!(key = %key, "store has no EC setting");
            let facts = replace_rows(tx, FACT_TABLE, &scope, &["cart_id"], Vec::new()).await?;
            let summaries = replace_rows(tx, SUMMARY_TABLE, &scope, &[], Vec::new()).await?;
            return Ok(facts.merge(summaries));
        };
        let rate = setting
            .get("commission_rate")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let orders: Vec<Record> = tx
            .find_many(
                ORDER_TABLE,
                &Filter::new()
                    .eq("store_id", key.store_id)
                    .is_in("status", [COMPLETED, CANCELED]),
            )
            .await?
            .into_iter()
            .filter(|o| timestamp(o, "finished_at").is_some_and(|at| key.contains(at)))
            .collect();

        let ids: Vec<Value> = orders.iter().filter_map(|o| o.get("id").cloned()).collect();
        let mut lines: HashMap<i64, Vec<Record>> = HashMap::new();
        if !ids.is_empty() {
            for line in tx
                .find_many(ORDER_LINE_TABLE, &Filter::new().is_in("order_cart_store_id", ids))
                .await?
            {
                lines.entry(int(&line, "order_cart_store_id")).or_default().push(line);
            }
        }
        debug!(key = %key, orders = orders.len(), "aggregating EC orders");

        let mut summary = Summary::default();
        let mut facts = Vec::new();

        for order in &orders {
            let total = int(order, "total_price");
            if order.get("status").and_then(Value::as_str) == Some(CANCELED) {
                summary.canceled_count += 1;
                summary.cancel_price += total;
                continue;
            }

            summary.completed_count += 1;
            summary.price += total;
            summary.shipping_fee += int(order, "shipping_fee");

            let order_lines = lines.get(&int(order, "id")).map_or(&[][..], Vec::as_slice);
            let mut changed = false;
            for line in order_lines {
                let item_count = int(line, "item_count");
                let original = int(line, "original_item_count");
                let unit_price = int(line, "total_unit_price");
                let wholesale = int(line, "wholesale_total_price");
                if item_count != original {
                    changed = true;
                    summary.change_price += (original - item_count) * unit_price;
                }
                summary.item_count += item_count;
                summary.wholesale_price += wholesale;

                let mut fact = key.record();
                fact.insert("cart_id".to_string(), Value::from(int(line, "id")));
                fact.insert("order_id".to_string(), Value::from(int(order, "order_id")));
                fact.insert("product_id".to_string(), Value::from(int(line, "product_id")));
                fact.insert("item_count".to_string(), Value::from(item_count));
                fact.insert("original_item_count".to_string(), Value::from(original));
                fact.insert("total_unit_price".to_string(), Value::from(unit_price));
                fact.insert("wholesale_total_price".to_string(), Value::from(wholesale));
                fact.insert(
                    "payment_method".to_string(),
                    order.get("payment_method").cloned().unwrap_or_else(|| Value::from("")),
                );
                fact.insert(
                    "order_completed_at".to_string(),
                    order.get("finished_at").cloned().unwrap_or(Value::Null),
                );
                facts.push(fact);
            }
            if changed {
                summary.change_count += 1;
            }
        }
        summary.commission_price = commission(summary.price, summary.shipping_fee, rate);

        let facts = replace_rows(tx, FACT_TABLE, &scope, &["cart_id"], facts).await?;
        let summaries = replace_rows(tx, SUMMARY_TABLE, &scope, &[], vec![summary.into_record(key)]).await?;
        Ok(facts.merge(summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoffice_core::{Database, MemoryDatabase};
    use chrono::NaiveDate;
    use serde_json::json;

    fn rows(values: Value) -> Vec<Record> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    async fn seeded() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        db.seed(SETTING_TABLE, rows(json!([{ "id": 1, "store_id": 3, "commission_rate": 8.5 }])))
            .await;
        db.seed(
            ORDER_TABLE,
            rows(json!([
                { "id": 1, "order_id": 100, "store_id": 3, "status": "completed",
                  "finished_at": "2024-03-01T10:00:00Z", "total_price": 2500, "shipping_fee": 500,
                  "payment_method": "card" },
                { "id": 2, "order_id": 101, "store_id": 3, "status": "canceled",
                  "finished_at": "2024-03-01T11:00:00Z", "total_price": 900, "shipping_fee": 300 },
                { "id": 3, "order_id": 102, "store_id": 3, "status": "completed",
                  "finished_at": "2024-03-01T12:00:00Z", "total_price": 1300, "shipping_fee": 300,
                  "payment_method": "bank" },
                { "id": 4, "order_id": 103, "store_id": 3, "status": "ordered",
                  "finished_at": "2024-03-01T13:00:00Z", "total_price": 9999, "shipping_fee": 0 },
                { "id": 5, "order_id": 104, "store_id": 3, "status": "completed",
                  "finished_at": "2024-03-02T00:00:00Z", "total_price": 7777, "shipping_fee": 0 },
                { "id": 6, "order_id": 105, "store_id": 4, "status": "completed",
                  "finished_at": "2024-03-01T10:00:00Z", "total_price": 4444, "shipping_fee": 0 }
            ])),
        )
        .await;
        db.seed(
            ORDER_LINE_TABLE,
            rows(json!([
                { "id": 10, "order_cart_store_id": 1, "product_id": 7, "item_count": 2,
                  "original_item_count": 3, "total_unit_price": 500, "wholesale_total_price": 600 },
                { "id": 11, "order_cart_store_id": 1, "product_id": 8, "item_count": 1,
                  "original_item_count": 1, "total_unit_price": 1000, "wholesale_total_price": 400 },
                { "id": 12, "order_cart_store_id": 2, "product_id": 7, "item_count": 1,
                  "original_item_count": 1, "total_unit_price": 600, "wholesale_total_price": 300 },
                { "id": 13, "order_cart_store_id": 3, "product_id": 9, "item_count": 1,
                  "original_item_count": 1, "total_unit_price": 1000, "wholesale_total_price": 700 }
            ])),
        )
        .await;
        db
    }

    fn key() -> JobKey {
        JobKey::new(3, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    async fn run(db: &MemoryDatabase) -> JobOutput {
        let mut tx = db.begin().await.unwrap();
        let out = EcDaily.compute(tx.as_mut(), &key()).await.unwrap();
        tx.commit().await.unwrap();
        out
    }

    #[test]
    fn test_commission_excludes_shipping() {
        assert_eq!(commission(3800, 800, 8.5), 255);
        assert_eq!(commission(1000, 0, 0.0), 0);
        assert_eq!(commission(10, 0, 5.0), 1);
    }

    #[tokio::test]
    async fn test_summary_counts_orders() {
        let db = seeded().await;
        let out = run(&db).await;
        assert_eq!(out.rows, 4);

        let summaries = db.rows(SUMMARY_TABLE).await;
        assert_eq!(summaries.len(), 1);
        let s = &summaries[0];
        assert_eq!(s["completed_count"], 2);
        assert_eq!(s["canceled_count"], 1);
        assert_eq!(s["price"], 3800);
        assert_eq!(s["shipping_fee"], 800);
        assert_eq!(s["cancel_price"], 900);
        assert_eq!(s["change_count"], 1);
        assert_eq!(s["change_price"], 500);
        assert_eq!(s["item_count"], 4);
        assert_eq!(s["wholesale_price"], 1700);
        assert_eq!(s["commission_price"], 255);
    }

    #[tokio::test]
    async fn test_facts_cover_completed_lines_only() {
        let db = seeded().await;
        run(&db).await;

        let facts = db.rows(FACT_TABLE).await;
        let mut carts: Vec<i64> = facts.iter().filter_map(|f| f["cart_id"].as_i64()).collect();
        carts.sort_unstable();
        assert_eq!(carts, vec![10, 11, 13]);

        let short = facts.iter().find(|f| f["cart_id"] == 10).unwrap();
        assert_eq!(short["order_id"], 100);
        assert_eq!(short["original_item_count"], 3);
        assert_eq!(short["payment_method"], "card");
    }

    #[tokio::test]
    async fn test_rerun_is_identical() {
        let db = seeded().await;
        run(&db).await;
        let facts = db.rows(FACT_TABLE).await;
        let summaries = db.rows(SUMMARY_TABLE).await;

        run(&db).await;
        assert_eq!(db.rows(FACT_TABLE).await, facts);
        assert_eq!(db.rows(SUMMARY_TABLE).await, summaries);
    }

    #[tokio::test]
    async fn test_store_without_setting_is_cleared() {
        let db = seeded().await;
        run(&db).await;
        assert!(!db.rows(FACT_TABLE).await.is_empty());

        let mut tx = db.begin().await.unwrap();
        tx.delete_many(SETTING_TABLE, &Filter::new().eq("store_id", 3)).await.unwrap();
        tx.commit().await.unwrap();

        let out = run(&db).await;
        assert_eq!(out.rows, 0);
        assert_eq!(out.removed, 4);
        assert!(db.rows(FACT_TABLE).await.is_empty());
        assert!(db.rows(SUMMARY_TABLE).await.is_empty());
    }
}
