//! End-to-end tests of the built-in store contracts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use backoffice::config::{AuthConfig, BackofficeConfig, Environment, JobsConfig, StreamSection};
use backoffice::core::{
    ApiEvent, BackofficeResult, BoxFuture, ContractDefinition, ContractHandler, MemoryDatabase,
    PosSession, Record, Reply, RequestContext, Role, Shape, StaticSessions,
};
use backoffice::server::{DispatchBody, DispatchRequest};
use backoffice::tasks::LEDGER_TABLE;
use backoffice::App;
use futures_util::StreamExt;
use http::{Method, StatusCode};
use serde_json::{json, Value};

const POS_TOKEN: &str = "pos-session";
const BOT_TOKEN: &str = "bot-secret";

fn rows(values: Value) -> Vec<Record> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
}

fn config() -> BackofficeConfig {
    BackofficeConfig::builder()
        .environment(Environment::Development)
        .auth(AuthConfig {
            bot_token: Some(BOT_TOKEN.to_string()),
            admin_token: None,
        })
        .stream(StreamSection {
            buffer_size: 16,
            keep_alive_secs: 0,
            retry_ms: 0,
        })
        .jobs(JobsConfig {
            enabled: false,
            ..JobsConfig::default()
        })
        .build()
}

async fn database() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.seed(
        "store",
        rows(json!([
            { "id": 1, "corporation_id": 1, "is_active": true, "opened": true, "display_name": "Main" },
            { "id": 2, "corporation_id": 1, "is_active": true, "opened": false, "display_name": "Annex" }
        ])),
    )
    .await;
    db.seed("announcement", rows(json!([{ "id": 7, "title": "Holiday hours" }]))).await;
    db
}

fn sessions() -> Arc<StaticSessions> {
    let sessions = Arc::new(StaticSessions::new());
    sessions.insert(POS_TOKEN, PosSession::new(10, 1).with_store(1));
    sessions
}

async fn app() -> (App, MemoryDatabase) {
    let db = database().await;
    let app = App::builder(config())
        .database(Arc::new(db.clone()))
        .sessions(sessions())
        .build()
        .unwrap();
    (app, db)
}

fn read(store_id: i64, announcement_id: i64) -> DispatchRequest {
    DispatchRequest::new(
        Method::POST,
        format!("/store/{store_id}/announcement/{announcement_id}/read"),
    )
    .bearer(POS_TOKEN)
}

#[tokio::test]
async fn read_receipt_is_upserted_once() {
    let (app, db) = app().await;

    for _ in 0..2 {
        let out = app.dispatcher().dispatch(read(1, 7)).await;
        assert_eq!(out.status, StatusCode::OK);
        assert_eq!(
            out.json_body().unwrap()["data"],
            json!({ "announcement_id": 7, "store_id": 1, "read": true })
        );
    }

    let receipts = db.rows("announcement_store").await;
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["announcement_id"], 7);
    assert_eq!(receipts[0]["store_id"], 1);
    assert_eq!(receipts[0]["read"], true);
}

#[tokio::test]
async fn undeclared_query_keys_are_ignored() {
    let (app, db) = app().await;
    let out = app.dispatcher().dispatch(read(1, 7).query("_=1700000000")).await;

    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(db.rows("announcement_store").await.len(), 1);
}

#[tokio::test]
async fn read_receipt_flips_an_unread_row() {
    let (app, db) = app().await;
    db.seed(
        "announcement_store",
        rows(json!([{ "announcement_id": 7, "store_id": 1, "read": false }])),
    )
    .await;

    let out = app.dispatcher().dispatch(read(1, 7)).await;
    assert_eq!(out.status, StatusCode::OK);

    let receipts = db.rows("announcement_store").await;
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["read"], true);
}

#[tokio::test]
async fn unknown_announcement_is_not_found_and_rolled_back() {
    let (app, db) = app().await;
    let out = app.dispatcher().dispatch(read(1, 99)).await;

    assert_eq!(out.status, StatusCode::NOT_FOUND);
    assert!(db.rows("announcement_store").await.is_empty());
    assert_eq!(db.commits(), 0);
}

#[tokio::test]
async fn foreign_store_is_forbidden() {
    let (app, db) = app().await;
    let out = app.dispatcher().dispatch(read(2, 7)).await;

    assert_eq!(out.status, StatusCode::FORBIDDEN);
    assert!(db.rows("announcement_store").await.is_empty());
}

#[tokio::test]
async fn bot_only_contract_rejects_pos_without_side_effects() {
    let (app, db) = app().await;
    let out = app
        .dispatcher()
        .dispatch(
            DispatchRequest::new(Method::POST, "/store/1/daily-calculate")
                .bearer(POS_TOKEN)
                .json(&json!({ "target_day": "2024-03-01" })),
        )
        .await;

    assert_eq!(out.status, StatusCode::FORBIDDEN);
    assert_eq!(out.json_body().unwrap()["error"]["category"], "permission");
    assert!(db.rows(LEDGER_TABLE).await.is_empty());
    assert!(db.rows("summary_daily_transaction").await.is_empty());
    assert_eq!(db.commits(), 0);
}

#[tokio::test]
async fn daily_calculate_by_bot_is_idempotent() {
    let (app, db) = app().await;
    db.seed(
        "transaction",
        rows(json!([
            { "id": 1, "store_id": 1, "kind": "sell", "status": "completed", "is_return": false,
              "finished_at": "2024-03-01T10:00:00Z", "total_sale_price": 1200, "discount_price": 0 }
        ])),
    )
    .await;
    db.seed(
        "transaction_cart",
        rows(json!([
            { "id": 1, "transaction_id": 1, "product_id": 5, "item_count": 3, "unit_price": 400,
              "discount_price": 0, "wholesale_total_price": 900 }
        ])),
    )
    .await;

    let calculate = || {
        DispatchRequest::new(Method::POST, "/store/1/daily-calculate")
            .header("bottoken", BOT_TOKEN)
            .json(&json!({ "target_day": "2024-03-01" }))
    };

    let out = app.dispatcher().dispatch(calculate()).await;
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(out.json_body().unwrap()["data"]["key"]["store_id"], 1);

    let facts = db.rows("fact_transaction_product").await;
    let summaries = db.rows("summary_daily_transaction").await;
    let ledger = db.rows(LEDGER_TABLE).await;
    assert_eq!(facts.len(), 1);
    assert_eq!(summaries.len(), 2);

    let out = app.dispatcher().dispatch(calculate()).await;
    assert_eq!(out.status, StatusCode::OK);
    assert_eq!(db.rows("fact_transaction_product").await, facts);
    assert_eq!(db.rows("summary_daily_transaction").await, summaries);
    assert_eq!(db.rows(LEDGER_TABLE).await, ledger);
}

#[tokio::test]
async fn daily_calculate_ignores_undeclared_body_fields() {
    let (app, db) = app().await;
    let out = app
        .dispatcher()
        .dispatch(
            DispatchRequest::new(Method::POST, "/store/1/daily-calculate")
                .header("bottoken", BOT_TOKEN)
                .json(&json!({ "target_day": "2024-03-01", "force": true })),
        )
        .await;

    assert_eq!(out.status, StatusCode::OK);
    assert!(!db.rows(LEDGER_TABLE).await.is_empty());
}

#[tokio::test]
async fn daily_calculate_rejects_a_malformed_day() {
    let (app, db) = app().await;
    let out = app
        .dispatcher()
        .dispatch(
            DispatchRequest::new(Method::POST, "/store/1/daily-calculate")
                .header("bottoken", BOT_TOKEN)
                .json(&json!({ "target_day": "2024-13-45" })),
        )
        .await;

    assert_eq!(out.status, StatusCode::BAD_REQUEST);
    assert!(out.json_body().unwrap()["error"]["details"]["fields"]["body.target_day"].is_array());
    assert!(db.rows(LEDGER_TABLE).await.is_empty());
}

#[tokio::test]
async fn stream_gets_snapshot_then_only_its_store_events() {
    let (app, _db) = app().await;
    let out = app
        .dispatcher()
        .dispatch(DispatchRequest::new(Method::GET, "/store/1/status/subscribe").bearer(POS_TOKEN))
        .await;
    assert_eq!(out.status, StatusCode::OK);
    let DispatchBody::Stream { mut stream, .. } = out.body else {
        panic!("expected a stream");
    };

    let snapshot = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(snapshot.contains("store_status_changed"));
    assert!(snapshot.contains("\"display_name\":\"Main\""));

    // Store 2 traffic must not reach a store 1 subscriber.
    app.fanout().publish_scoped(&ApiEvent::AnnouncementRead {
        store_id: 2,
        announcement_id: 7,
    });
    let out = app.dispatcher().dispatch(read(1, 7)).await;
    assert_eq!(out.status, StatusCode::OK);

    let next = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(next.contains("announcement_read"));
    assert!(next.contains("\"store_id\":1"));
}

#[tokio::test]
async fn stream_delivers_events_in_publish_order() {
    let (app, _db) = app().await;
    let out = app
        .dispatcher()
        .dispatch(DispatchRequest::new(Method::GET, "/store/1/status/subscribe").bearer(POS_TOKEN))
        .await;
    let DispatchBody::Stream { mut stream, .. } = out.body else {
        panic!("expected a stream");
    };
    let _snapshot = stream.next().await;

    for message in ["A", "B"] {
        app.fanout().publish_scoped(&ApiEvent::GenericMessage {
            store_id: Some(1),
            message: message.to_string(),
            data: Value::Null,
        });
    }

    let first = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    let second = String::from_utf8(stream.next().await.unwrap().unwrap().to_vec()).unwrap();
    assert!(first.contains("\"message\":\"A\""));
    assert!(second.contains("\"message\":\"B\""));
}

/// Counts calls and writes a row.
struct Counting(Arc<AtomicUsize>);

impl ContractHandler for Counting {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, BackofficeResult<Reply>> {
        Box::pin(async move {
            self.0.fetch_add(1, Ordering::SeqCst);
            let mut row = Record::new();
            row.insert("title".to_string(), ctx.input().body["title"].clone());
            ctx.tx().await.create("memo", row).await?;
            Ok(Reply::empty())
        })
    }
}

async fn app_with_memo() -> (App, MemoryDatabase, Arc<AtomicUsize>) {
    let db = database().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::builder(config())
        .database(Arc::new(db.clone()))
        .sessions(sessions())
        .contract(
            ContractDefinition::builder("createMemo")
                .method(Method::POST)
                .path("store/[store_id]/memo")
                .role(Role::Admin)
                .param("store_id", Shape::integer().required())
                .body(Shape::object([
                    ("title", Shape::string().required().min_len(1)),
                    ("pinned", Shape::boolean().required()),
                ]))
                .build()
                .unwrap(),
            Counting(Arc::clone(&calls)),
        )
        .unwrap()
        .build()
        .unwrap();
    (app, db, calls)
}

#[tokio::test]
async fn wrong_role_never_reaches_the_handler() {
    let (app, db, calls) = app_with_memo().await;
    let out = app
        .dispatcher()
        .dispatch(
            DispatchRequest::new(Method::POST, "/store/1/memo")
                .bearer(POS_TOKEN)
                .json(&json!({ "title": "x", "pinned": false })),
        )
        .await;

    assert_eq!(out.status, StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(db.rows("memo").await.is_empty());
}

#[tokio::test]
async fn missing_fields_are_all_listed_and_nothing_commits() {
    let (app, db, calls) = app_with_memo().await;
    let out = app
        .dispatcher()
        .dispatch(
            DispatchRequest::new(Method::POST, "/store/1/memo")
                .bearer(POS_TOKEN)
                .json(&json!({})),
        )
        .await;

    assert_eq!(out.status, StatusCode::BAD_REQUEST);
    let fields = &out.json_body().unwrap()["error"]["details"]["fields"];
    assert!(fields["body.title"].is_array());
    assert!(fields["body.pinned"].is_array());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(db.commits(), 0);
}
