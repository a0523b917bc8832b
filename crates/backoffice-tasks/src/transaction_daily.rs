//! Daily sales aggregation.
//!
//! Source tables:
//!
//! - `transaction`: `id`, `store_id`, `kind` (`sell` | `buy`), `status`,
//!   `is_return`, `finished_at` (RFC 3339), `total_sale_price`,
//!   `discount_price`
//! - `transaction_cart`: `id`, `transaction_id`, `product_id`, `item_count`,
//!   `unit_price`, `discount_price`, `wholesale_total_price`
//!
//! Output tables, both scoped by `(store_id, target_day)`:
//!
//! - `fact_transaction_product`: one row per cart line, keyed by `cart_id`
//! - `summary_daily_transaction`: one `SELL` and one `BUY` row, keyed by `kind`
//!
//! Returns count with factor -1 on line quantities and wholesale totals, and
//! go to `return_price` / `return_count` instead of `price` / `count`.

use std::collections::HashMap;

use async_trait::async_trait;
use backoffice_core::{BackofficeResult, Filter, Record, Transaction};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::job::{flag, int, replace_rows, timestamp, AggregationJob, JobKey, JobOutput};

/// Table of completed and pending transactions.
pub const TRANSACTION_TABLE: &str = "transaction";
/// Table of transaction lines.
pub const CART_TABLE: &str = "transaction_cart";
/// Per-line fact output.
pub const FACT_TABLE: &str = "fact_transaction_product";
/// Per-kind daily summary output.
pub const SUMMARY_TABLE: &str = "summary_daily_transaction";

/// Transaction status counted by the aggregation.
pub const COMPLETED: &str = "completed";

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Sell,
    Buy,
}

impl Kind {
    fn parse(value: Option<&Value>) -> Option<Self> {
        match value.and_then(Value::as_str)? {
            "sell" => Some(Self::Sell),
            "buy" => Some(Self::Buy),
            _ => None,
        }
    }

    const fn summary_name(self) -> &'static str {
        match self {
            Self::Sell => "SELL",
            Self::Buy => "BUY",
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    price: i64,
    count: i64,
    return_price: i64,
    return_count: i64,
    item_count: i64,
    discount_price: i64,
    wholesale_price: i64,
}

impl Summary {
    fn into_record(self, key: &JobKey, kind: Kind) -> Record {
        let mut row = key.record();
        row.insert("kind".to_string(), Value::from(kind.summary_name()));
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            row.extend(fields);
        }
        row
    }
}

/// The `transaction_daily` job.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionDaily;

#[async_trait]
impl AggregationJob for TransactionDaily {
    fn name(&self) -> &'static str {
        "transaction_daily"
    }

    async fn compute(&self, tx: &mut dyn Transaction, key: &JobKey) -> BackofficeResult<JobOutput> {
        let transactions: Vec<Record> = tx
            .find_many(
                TRANSACTION_TABLE,
                &Filter::new().eq("store_id", key.store_id).eq("status", COMPLETED),
            )
            .await?
            .into_iter()
            .filter(|t| timestamp(t, "finished_at").is_some_and(|at| key.contains(at)))
            .collect();

        let ids: Vec<Value> = transactions.iter().filter_map(|t| t.get("id").cloned()).collect();
        let mut lines: HashMap<i64, Vec<Record>> = HashMap::new();
        if !ids.is_empty() {
            for line in tx.find_many(CART_TABLE, &Filter::new().is_in("transaction_id", ids)).await? {
                lines.entry(int(&line, "transaction_id")).or_default().push(line);
            }
        }
        debug!(key = %key, transactions = transactions.len(), "aggregating transactions");

        let mut sell = Summary::default();
        let mut buy = Summary::default();
        let mut facts = Vec::new();

        for t in &transactions {
            let Some(kind) = Kind::parse(t.get("kind")) else {
                continue;
            };
            let is_return = flag(t, "is_return");
            let factor = if is_return { -1 } else { 1 };
            let summary = match kind {
                Kind::Sell => &mut sell,
                Kind::Buy => &mut buy,
            };

            for line in lines.get(&int(t, "id")).into_iter().flatten() {
                let item_count = factor * int(line, "item_count");
                let wholesale = factor * int(line, "wholesale_total_price");
                summary.item_count += item_count;
                if kind == Kind::Sell {
                    summary.wholesale_price += wholesale;
                }

                let mut fact = key.record();
                fact.insert("cart_id".to_string(), Value::from(int(line, "id")));
                fact.insert("transaction_id".to_string(), Value::from(int(t, "id")));
                fact.insert("product_id".to_string(), Value::from(int(line, "product_id")));
                fact.insert("transaction_kind".to_string(), Value::from(kind.summary_name()));
                fact.insert("is_return".to_string(), Value::from(is_return));
                fact.insert("item_count".to_string(), Value::from(item_count));
                fact.insert("unit_price".to_string(), Value::from(int(line, "unit_price")));
                fact.insert("discount_price".to_string(), Value::from(int(line, "discount_price")));
                fact.insert("wholesale_total_price".to_string(), Value::from(wholesale));
                facts.push(fact);
            }

            let total = int(t, "total_sale_price");
            if is_return {
                summary.return_price += total;
                summary.return_count += 1;
            } else {
                summary.price += total;
                summary.count += 1;
            }
            summary.discount_price += factor * int(t, "discount_price");
        }

        let scope = key.scope();
        let facts = replace_rows(tx, FACT_TABLE, &scope, &["cart_id"], facts).await?;
        let summaries = replace_rows(
            tx,
            SUMMARY_TABLE,
            &scope,
            &["kind"],
            vec![sell.into_record(key, Kind::Sell), buy.into_record(key, Kind::Buy)],
        )
        .await?;
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
        db.seed(
            TRANSACTION_TABLE,
            rows(json!([
                { "id": 1, "store_id": 3, "kind": "sell", "status": "completed", "is_return": false,
                  "finished_at": "2024-03-01T10:00:00Z", "total_sale_price": 1000, "discount_price": 100 },
                { "id": 2, "store_id": 3, "kind": "sell", "status": "completed", "is_return": true,
                  "finished_at": "2024-03-01T12:00:00Z", "total_sale_price": 300, "discount_price": 0 },
                { "id": 3, "store_id": 3, "kind": "buy", "status": "completed", "is_return": false,
                  "finished_at": "2024-03-01T15:00:00Z", "total_sale_price": 500, "discount_price": 0 },
                { "id": 4, "store_id": 3, "kind": "sell", "status": "draft", "is_return": false,
                  "finished_at": "2024-03-01T16:00:00Z", "total_sale_price": 9999, "discount_price": 0 },
                { "id": 5, "store_id": 3, "kind": "sell", "status": "completed", "is_return": false,
                  "finished_at": "2024-03-02T00:00:00Z", "total_sale_price": 7777, "discount_price": 0 },
                { "id": 6, "store_id": 4, "kind": "sell", "status": "completed", "is_return": false,
                  "finished_at": "2024-03-01T10:00:00Z", "total_sale_price": 4444, "discount_price": 0 }
            ])),
        )
        .await;
        db.seed(
            CART_TABLE,
            rows(json!([
                { "id": 10, "transaction_id": 1, "product_id": 100, "item_count": 2, "unit_price": 550,
                  "discount_price": 50, "wholesale_total_price": 600 },
                { "id": 11, "transaction_id": 2, "product_id": 100, "item_count": 1, "unit_price": 300,
                  "discount_price": 0, "wholesale_total_price": 300 },
                { "id": 12, "transaction_id": 3, "product_id": 200, "item_count": 5, "unit_price": 100,
                  "discount_price": 0, "wholesale_total_price": 0 }
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
        let out = TransactionDaily.compute(tx.as_mut(), &key()).await.unwrap();
        tx.commit().await.unwrap();
        out
    }

    fn summary(rows: &[Record], kind: &str) -> Record {
        rows.iter().find(|r| r["kind"] == kind).cloned().unwrap()
    }

    #[tokio::test]
    async fn test_sell_and_buy_summaries() {
        let db = seeded().await;
        let out = run(&db).await;
        assert_eq!(out.rows, 5);

        let summaries = db.rows(SUMMARY_TABLE).await;
        let sell = summary(&summaries, "SELL");
        assert_eq!(sell["price"], 1000);
        assert_eq!(sell["count"], 1);
        assert_eq!(sell["return_price"], 300);
        assert_eq!(sell["return_count"], 1);
        assert_eq!(sell["item_count"], 1);
        assert_eq!(sell["wholesale_price"], 300);
        assert_eq!(sell["discount_price"], 100);

        let buy = summary(&summaries, "BUY");
        assert_eq!(buy["price"], 500);
        assert_eq!(buy["item_count"], 5);
        assert_eq!(buy["wholesale_price"], 0);
    }

    #[tokio::test]
    async fn test_return_lines_are_negative() {
        let db = seeded().await;
        run(&db).await;

        let facts = db.rows(FACT_TABLE).await;
        assert_eq!(facts.len(), 3);
        let returned = facts.iter().find(|f| f["cart_id"] == 11).unwrap();
        assert_eq!(returned["item_count"], -1);
        assert_eq!(returned["wholesale_total_price"], -300);
        assert_eq!(returned["is_return"], true);
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
    async fn test_empty_day_writes_zero_summaries() {
        let db = MemoryDatabase::new();
        let out = run(&db).await;
        assert_eq!(out.rows, 2);

        let summaries = db.rows(SUMMARY_TABLE).await;
        assert_eq!(summary(&summaries, "SELL")["price"], 0);
        assert!(db.rows(FACT_TABLE).await.is_empty());
    }
}
