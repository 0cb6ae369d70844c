//! Tests against real servers.
//!
//! Each test reads `TEST_MYSQL_URL`, `TEST_POSTGRES_URL` or `TEST_REDIS_URL`
//! and returns early when the variable is unset.

use db_bridge_mcp::cache::{CacheManager, RedisClient};
use db_bridge_mcp::config::{PoolOptions, ToolSettings};
use db_bridge_mcp::db::{ConnectionManager, Repository};
use db_bridge_mcp::models::ConnectionConfig;
use db_bridge_mcp::tools::{
    AnalyticsInput, AnalyticsToolHandler, CacheToolHandler, CountInput, DescribeTableInput,
    InsightsToolHandler, MetadataInput, PreviewInput, QueryInput, QueryToolHandler,
    RedisGetInput, RedisScanInput, RedisSetInput, SchemaToolHandler, SemanticSummaryInput,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

fn env_url(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("{} not set, skipping", name);
            None
        }
    }
}

async fn connect(id: &str, url: &str) -> Arc<ConnectionManager> {
    let manager = Arc::new(ConnectionManager::new());
    let config = ConnectionConfig::new(id, url, None, PoolOptions::default()).unwrap();
    manager.connect(config, TIMEOUT).await.unwrap();
    manager
}

const SETUP: &[&str] = &[
    "DROP TABLE IF EXISTS bridge_orders",
    "DROP TABLE IF EXISTS bridge_customers",
    "CREATE TABLE bridge_customers (id INT PRIMARY KEY, name VARCHAR(64) NOT NULL, tier VARCHAR(16))",
    "CREATE TABLE bridge_orders (id INT PRIMARY KEY, customer_id INT NOT NULL, total INT NOT NULL, \
     FOREIGN KEY (customer_id) REFERENCES bridge_customers (id))",
    "INSERT INTO bridge_customers VALUES (1, 'ann', 'gold'), (2, 'bob', 'basic'), (3, 'O''Neil', 'gold')",
    "INSERT INTO bridge_orders VALUES (10, 1, 100), (11, 1, 50), (12, 2, 75)",
];

const MYSQL_PAYMENTS: &[&str] = &[
    "DROP TABLE IF EXISTS bridge_payments",
    "CREATE TABLE bridge_payments (id INT PRIMARY KEY, day DATE NOT NULL, \
     amount DECIMAL(10,2) NOT NULL, note VARCHAR(16) COMMENT 'payment method') \
     COMMENT = 'Payments received'",
    "INSERT INTO bridge_payments VALUES (1, '2024-01-01', 10.00, 'card'), \
     (2, '2024-01-02', 20.00, 'card'), (3, '2024-01-03', 99.99, 'refund')",
];

const PG_PAYMENTS: &[&str] = &[
    "DROP TABLE IF EXISTS bridge_payments",
    "CREATE TABLE bridge_payments (id UUID PRIMARY KEY, day DATE NOT NULL, \
     amount NUMERIC(10,2) NOT NULL, note VARCHAR(16))",
    "COMMENT ON TABLE bridge_payments IS 'Payments received'",
    "COMMENT ON COLUMN bridge_payments.note IS 'payment method'",
    "INSERT INTO bridge_payments VALUES \
     ('00000000-0000-4000-8000-000000000001', '2024-01-01', 10.00, 'card'), \
     ('6f1c2a4e-9b3d-4c8a-a1e2-3b4c5d6e7f80', '2024-01-02', 20.00, 'card'), \
     ('00000000-0000-4000-8000-000000000003', '2024-01-03', 99.99, 'refund')",
];

const PG_SECOND_PAYMENT: &str = "6f1c2a4e-9b3d-4c8a-a1e2-3b4c5d6e7f80";

fn query_input(id: &str, table: &str, conditions: Value) -> QueryInput {
    serde_json::from_value(json!({
        "database": id,
        "table": table,
        "conditions": conditions,
        "dry_run": false
    }))
    .unwrap()
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::String(s) => s.parse().unwrap(),
        Value::Number(n) => n.as_f64().unwrap(),
        other => panic!("not numeric: {other}"),
    }
}

/// Date, decimal and (on PostgreSQL) uuid columns through bound and unbound reads.
async fn exercise_typed(manager: Arc<ConnectionManager>, id: &str, uuid_key: Option<&str>) {
    let settings = Arc::new(ToolSettings::default());
    let query = QueryToolHandler::new(manager.clone(), settings.clone());

    // Bound string compared against a DATE column
    let output = query
        .query(query_input(id, "bridge_payments", json!({"day": "2024-01-01"})))
        .await
        .unwrap();
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["day"], json!("2024-01-01"));
    assert_eq!(output.rows[0]["amount"], json!("10.00"));

    if let Some(uuid_key) = uuid_key {
        let output = query
            .query(query_input(id, "bridge_payments", json!({"id": uuid_key})))
            .await
            .unwrap();
        assert_eq!(output.row_count, 1);
        assert_eq!(output.rows[0]["id"], json!(uuid_key));
        assert_eq!(output.rows[0]["day"], json!("2024-01-02"));
        assert_eq!(output.rows[0]["amount"], json!("20.00"));
    }

    // No parameters: the unbound read path
    let preview = query
        .preview(PreviewInput {
            database: id.to_string(),
            table: "bridge_payments".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(preview.row_count, 3);
    let second = preview
        .data
        .iter()
        .find(|row| row["day"] == json!("2024-01-02"))
        .unwrap();
    assert_eq!(second["amount"], json!("20.00"));
    if let Some(uuid_key) = uuid_key {
        assert_eq!(second["id"], json!(uuid_key));
    }

    let analytics = AnalyticsToolHandler::new(manager.clone(), settings.clone());
    let output = analytics
        .analyze(
            serde_json::from_value::<AnalyticsInput>(json!({
                "database": id,
                "table": "bridge_payments",
                "column": "amount",
                "function": "avg",
                "conditions": {"note": "card"}
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(output.result_count, 1);
    assert_eq!(as_f64(&output.results[0]["result"]), 15.0);

    let schema = SchemaToolHandler::new(manager.clone(), CacheManager::new());
    let metadata = schema
        .metadata(MetadataInput {
            database: id.to_string(),
            table: "bridge_payments".to_string(),
            schema: None,
        })
        .await
        .unwrap();
    assert!(metadata.warning.is_none());
    assert_eq!(metadata.table_comment.as_deref(), Some("Payments received"));
    assert_eq!(metadata.column_count, 4);
    assert_eq!(metadata.columns[0].key.as_deref(), Some("PRI"));
    assert_eq!(metadata.columns[3].comment.as_deref(), Some("payment method"));

    let insights = InsightsToolHandler::new(manager.clone(), CacheManager::new(), settings);
    let summary = insights
        .semantic_summary(SemanticSummaryInput {
            database: id.to_string(),
            table: "bridge_payments".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(summary.sample_count, 3);
    assert_eq!(summary.columns.len(), 4);
    assert!(summary.llm_prompt.contains("named \"bridge_payments\""));
}

async fn exercise(manager: Arc<ConnectionManager>, id: &str) {
    let repo = manager.get(id).await.unwrap();
    let tables = repo.list_tables(None).await.unwrap();
    assert!(tables.contains(&"bridge_orders".to_string()));

    let settings = Arc::new(ToolSettings::default());
    let query = QueryToolHandler::new(manager.clone(), settings.clone());

    let output = query
        .query(
            serde_json::from_value::<QueryInput>(json!({
                "database": id,
                "table": "bridge_customers",
                "conditions": {"name": "O'Neil"},
                "dry_run": false
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["tier"], json!("gold"));

    // The payload is bound as a value, so it matches nothing
    let output = query
        .query(
            serde_json::from_value::<QueryInput>(json!({
                "database": id,
                "table": "bridge_customers",
                "conditions": {"name": "' OR '1'='1"},
                "dry_run": false
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(output.row_count, 0);

    let count = query
        .count(
            serde_json::from_value::<CountInput>(json!({
                "database": id,
                "table": "bridge_orders",
                "conditions": {"customer_id": 1}
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(count.count, 2);

    let schema = SchemaToolHandler::new(manager.clone(), CacheManager::new());
    let described = schema
        .describe_table(DescribeTableInput {
            database: id.to_string(),
            table: "bridge_orders".to_string(),
            schema: None,
            include_row_count: true,
        })
        .await
        .unwrap();
    assert_eq!(described.primary_key, vec!["id"]);
    assert_eq!(described.row_count, Some(3));
    assert_eq!(described.foreign_keys.len(), 1);
    assert_eq!(described.foreign_keys[0].referenced_table, "bridge_customers");

    let analytics = AnalyticsToolHandler::new(manager.clone(), settings);
    let output = analytics
        .analyze(
            serde_json::from_value::<AnalyticsInput>(json!({
                "database": id,
                "table": "bridge_orders",
                "column": "total",
                "function": "max",
                "group_by": "customer_id"
            }))
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(output.function, "MAX");
    assert_eq!(output.result_count, 2);

    manager.close_all().await;
}

#[tokio::test]
async fn mysql_end_to_end() {
    let Some(url) = env_url("TEST_MYSQL_URL") else {
        return;
    };
    let pool = sqlx::MySqlPool::connect(&url).await.unwrap();
    for statement in SETUP {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    for statement in MYSQL_PAYMENTS {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let manager = connect("mysql_live", &url).await;
    exercise_typed(manager.clone(), "mysql_live", None).await;
    exercise(manager, "mysql_live").await;
}

#[tokio::test]
async fn postgres_end_to_end() {
    let Some(url) = env_url("TEST_POSTGRES_URL") else {
        return;
    };
    let pool = sqlx::PgPool::connect(&url).await.unwrap();
    for statement in SETUP {
        let statement = statement.replace(
            "DROP TABLE IF EXISTS bridge_customers",
            "DROP TABLE IF EXISTS bridge_customers CASCADE",
        );
        sqlx::query(&statement).execute(&pool).await.unwrap();
    }
    for statement in PG_PAYMENTS {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;

    let manager = connect("pg_live", &url).await;
    exercise_typed(manager.clone(), "pg_live", Some(PG_SECOND_PAYMENT)).await;
    exercise(manager, "pg_live").await;
}

#[tokio::test]
async fn redis_end_to_end() {
    let Some(url) = env_url("TEST_REDIS_URL") else {
        return;
    };
    let caches = CacheManager::new();
    caches
        .insert(RedisClient::connect("live", &url, TIMEOUT).await.unwrap())
        .await
        .unwrap();

    let settings = ToolSettings {
        scan_count: 2,
        max_scan_keys: 3,
        ..ToolSettings::default()
    };
    let handler = CacheToolHandler::new(caches.clone(), Arc::new(settings));

    for i in 0..5 {
        handler
            .set(RedisSetInput {
                redis: "live".to_string(),
                key: format!("bridge:test:{}", i),
                value: format!("v{}", i),
                ttl_secs: Some(60),
            })
            .await
            .unwrap();
    }

    let got = handler
        .get(RedisGetInput {
            redis: "live".to_string(),
            key: "bridge:test:3".to_string(),
        })
        .await
        .unwrap();
    assert!(got.found);
    assert_eq!(got.value.as_deref(), Some("v3"));

    let missing = handler
        .get(RedisGetInput {
            redis: "live".to_string(),
            key: "bridge:test:missing".to_string(),
        })
        .await
        .unwrap();
    assert!(!missing.found);

    let scanned = handler
        .scan(RedisScanInput {
            redis: "live".to_string(),
            pattern: Some("bridge:test:*".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(scanned.count, 3);
    assert!(scanned.limited);

    caches.close_all().await;
}
