//! Daily stock aggregation.
//!
//! Reads `product` (`id`, `store_id`, `display_name`, `stock_number`,
//! `sell_price`, `is_active`, `deleted`) and `product_wholesale_price`
//! (`product_id`, `unit_price`, `item_count`), and writes one
//! `fact_daily_product` row per product in stock plus one
//! `summary_daily_product` row for the store.
//!
//! Stock is read as it stands when the job runs; the scheduler runs shortly
//! after midnight so that matches the close of the target day.

use std::collections::HashMap;

use async_trait::async_trait;
use backoffice_core::{BackofficeResult, Filter, Record, Transaction};
use serde_json::Value;
use tracing::debug;

use crate::job::{flag, int, replace_rows, AggregationJob, JobKey, JobOutput};

/// Product master table.
pub const PRODUCT_TABLE: &str = "product";
/// Purchase lots with their unit cost.
pub const WHOLESALE_TABLE: &str = "product_wholesale_price";
/// Per-product fact output.
pub const FACT_TABLE: &str = "fact_daily_product";
/// Per-store summary output.
pub const SUMMARY_TABLE: &str = "summary_daily_product";

/// The `product_daily` job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductDaily;

#[async_trait]
impl AggregationJob for ProductDaily {
    fn name(&self) -> &'static str {
        "product_daily"
    }

    async fn compute(&self, tx: &mut dyn Transaction, key: &JobKey) -> BackofficeResult<JobOutput> {
        let products: Vec<Record> = tx
            .find_many(
                PRODUCT_TABLE,
                &Filter::new().eq("store_id", key.store_id).eq("is_active", true),
            )
            .await?
            .into_iter()
            .filter(|p| !flag(p, "deleted") && int(p, "stock_number") > 0)
            .collect();

        let ids: Vec<Value> = products.iter().filter_map(|p| p.get("id").cloned()).collect();
        let mut wholesale: HashMap<i64, i64> = HashMap::new();
        if !ids.is_empty() {
            for lot in tx.find_many(WHOLESALE_TABLE, &Filter::new().is_in("product_id", ids)).await? {
                *wholesale.entry(int(&lot, "product_id")).or_default() +=
                    int(&lot, "unit_price") * int(&lot, "item_count");
            }
        }
        debug!(key = %key, products = products.len(), "aggregating stock");

        let (mut stock_total, mut sell_total, mut wholesale_total) = (0_i64, 0_i64, 0_i64);
        let mut facts = Vec::with_capacity(products.len());
        for product in &products {
            let id = int(product, "id");
            let stock = int(product, "stock_number");
            let sell_price = int(product, "sell_price");
            let cost = wholesale.get(&id).copied().unwrap_or(0);

            let mut fact = key.record();
            fact.insert("product_id".to_string(), Value::from(id));
            fact.insert(
                "product_display_name".to_string(),
                product.get("display_name").cloned().unwrap_or(Value::Null),
            );
            fact.insert("stock_number".to_string(), Value::from(stock));
            fact.insert("sell_price".to_string(), Value::from(sell_price));
            fact.insert("total_sale_price".to_string(), Value::from(sell_price * stock));
            fact.insert("total_wholesale_price".to_string(), Value::from(cost));
            facts.push(fact);

            stock_total += stock;
            sell_total += sell_price * stock;
            wholesale_total += cost;
        }

        let mut summary = key.record();
        summary.insert("total_stock_number".to_string(), Value::from(stock_total));
        summary.insert("total_sell_price".to_string(), Value::from(sell_total));
        summary.insert("total_wholesale_price".to_string(), Value::from(wholesale_total));

        let scope = key.scope();
        let facts = replace_rows(tx, FACT_TABLE, &scope, &["product_id"], facts).await?;
        let summary = replace_rows(tx, SUMMARY_TABLE, &scope, &[], vec![summary]).await?;
        Ok(facts.merge(summary))
    }
}
