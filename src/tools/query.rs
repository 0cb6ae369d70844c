//! Row-reading tools: `db_query`, `db_count` and `db_table_preview`.
//!
//! Every statement is produced by [`QueryBuilder`]; callers never send SQL.

use crate::config::ToolSettings;
use crate::db::{ConnectionManager, ExecuteOptions, QueryBuilder, Repository};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, ConditionMap, QueryParam, QueryPlan};
use crate::tools::order_by_warning;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

const DRY_RUN_DESCRIPTION: &str = "Preview of the SQL query. Set dry_run=false to execute.";

/// Input for the db_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Table to read. May be schema-qualified, e.g. `shop.orders`
    pub table: String,
    /// Column filters combined with AND. String values containing % or _ match with LIKE, everything else with =
    #[serde(default)]
    pub conditions: ConditionMap,
    /// Maximum rows. Missing, zero, negative or above the server maximum means the server maximum
    #[serde(default)]
    pub limit: Option<i64>,
    /// Rows to skip. Negative values are treated as 0
    #[serde(default)]
    pub offset: Option<i64>,
    /// Ordering such as `created_at DESC, id ASC`. Anything else is ignored with a warning
    #[serde(default)]
    pub order_by: Option<String>,
    /// Return the SQL and parameters without executing. Defaults to the server setting
    #[serde(default)]
    pub dry_run: Option<bool>,
}

/// Output from the db_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    pub database: String,
    pub table: String,
    /// True when the query was only built, not executed
    pub dry_run: bool,
    /// SQL text with placeholders
    pub query: String,
    /// Values bound to the placeholders, in order
    pub params: Vec<QueryParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Input for the db_count tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CountInput {
    /// Database instance name from list_databases
    pub database: String,
    pub table: String,
    /// Same filter rules as db_query
    #[serde(default)]
    pub conditions: ConditionMap,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CountOutput {
    pub database: String,
    pub table: String,
    pub count: i64,
}

/// Input for the db_table_preview tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PreviewInput {
    /// Database instance name from list_databases
    pub database: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct PreviewOutput {
    pub database: String,
    pub table: String,
    pub preview_limit: u32,
    pub columns: Vec<ColumnMetadata>,
    pub data: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
}

/// Resolve the effective row limit: anything outside `1..=max_rows` becomes `max_rows`.
pub fn effective_limit(requested: Option<i64>, max_rows: u32) -> u32 {
    match requested {
        Some(limit) if limit > 0 && limit <= i64::from(max_rows) => limit as u32,
        _ => max_rows,
    }
}

/// Negative offsets become 0.
pub fn effective_offset(requested: Option<i64>) -> u32 {
    requested
        .unwrap_or(0)
        .clamp(0, i64::from(u32::MAX)) as u32
}

/// Read the single value of a `COUNT(*)` row.
///
/// The column is named `COUNT(*)` on MySQL and `count` on PostgreSQL, so the
/// first value is taken regardless of its key.
pub(crate) fn count_value(row: Option<&serde_json::Map<String, JsonValue>>) -> DbResult<i64> {
    let value = row
        .and_then(|row| row.values().next())
        .ok_or_else(|| DbError::internal("COUNT query returned no rows"))?;
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| DbError::internal(format!("COUNT returned non-integer {}", n))),
        JsonValue::String(s) => s
            .parse()
            .map_err(|_| DbError::internal(format!("COUNT returned non-integer '{}'", s))),
        other => Err(DbError::internal(format!("COUNT returned {}", other))),
    }
}

/// Handler for the row-reading tools.
pub struct QueryToolHandler {
    connection_manager: Arc<ConnectionManager>,
    settings: Arc<ToolSettings>,
}

impl QueryToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, settings: Arc<ToolSettings>) -> Self {
        Self {
            connection_manager,
            settings,
        }
    }

    /// Build the SELECT for a db_query call without touching the database.
    pub fn plan_query(&self, builder: QueryBuilder, input: &QueryInput) -> DbResult<QueryPlan> {
        builder.build_select(
            &input.table,
            &input.conditions,
            effective_limit(input.limit, self.settings.max_rows),
            effective_offset(input.offset),
            input.order_by.as_deref().unwrap_or(""),
        )
    }

    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let builder = QueryBuilder::new(repo.dialect());
        let plan = self.plan_query(builder, &input)?;
        let warning = order_by_warning(input.order_by.as_deref());
        let dry_run = input.dry_run.unwrap_or(self.settings.default_dry_run);

        info!(
            database = %input.database,
            table = %input.table,
            dry_run,
            conditions = input.conditions.len(),
            "db_query"
        );

        if dry_run {
            return Ok(QueryOutput {
                database: input.database,
                table: input.table,
                dry_run: true,
                query: plan.sql,
                params: plan.params,
                description: Some(DRY_RUN_DESCRIPTION.to_string()),
                columns: Vec::new(),
                rows: Vec::new(),
                row_count: 0,
                execution_time_ms: None,
                warning,
            });
        }

        let result = repo
            .execute(&plan, ExecuteOptions::with_limit(self.settings.max_rows))
            .await?;

        Ok(QueryOutput {
            database: input.database,
            table: input.table,
            dry_run: false,
            query: plan.sql,
            params: plan.params,
            description: None,
            row_count: result.row_count(),
            columns: result.columns,
            rows: result.rows,
            execution_time_ms: Some(result.execution_time_ms),
            warning,
        })
    }

    pub async fn count(&self, input: CountInput) -> DbResult<CountOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let plan = QueryBuilder::new(repo.dialect()).build_count(&input.table, &input.conditions)?;

        info!(database = %input.database, table = %input.table, "db_count");

        let row = repo.execute_one(&plan, None).await?;
        Ok(CountOutput {
            count: count_value(row.as_ref())?,
            database: input.database,
            table: input.table,
        })
    }

    pub async fn preview(&self, input: PreviewInput) -> DbResult<PreviewOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let preview_limit = self.settings.preview_limit;
        let plan = QueryBuilder::new(repo.dialect()).build_select(
            &input.table,
            &ConditionMap::new(),
            preview_limit,
            0,
            "",
        )?;

        info!(database = %input.database, table = %input.table, "db_table_preview");

        let result = repo
            .execute(&plan, ExecuteOptions::with_limit(preview_limit))
            .await?;
        Ok(PreviewOutput {
            database: input.database,
            table: input.table,
            preview_limit,
            row_count: result.row_count(),
            columns: result.columns,
            data: result.rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Dialect;
    use serde_json::json;

    fn handler(settings: ToolSettings) -> QueryToolHandler {
        QueryToolHandler::new(Arc::new(ConnectionManager::new()), Arc::new(settings))
    }

    fn input(value: JsonValue) -> QueryInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(effective_limit(None, 1000), 1000);
        assert_eq!(effective_limit(Some(0), 1000), 1000);
        assert_eq!(effective_limit(Some(-5), 1000), 1000);
        assert_eq!(effective_limit(Some(5000), 1000), 1000);
        assert_eq!(effective_limit(Some(25), 1000), 25);
        assert_eq!(effective_limit(Some(1000), 1000), 1000);
    }

    #[test]
    fn test_effective_offset() {
        assert_eq!(effective_offset(None), 0);
        assert_eq!(effective_offset(Some(-10)), 0);
        assert_eq!(effective_offset(Some(40)), 40);
    }

    #[test]
    fn test_plan_query_applies_limits() {
        let handler = handler(ToolSettings {
            max_rows: 100,
            ..ToolSettings::default()
        });
        let input = input(json!({
            "database": "shop",
            "table": "orders",
            "conditions": {"status": "paid"},
            "limit": 500,
            "offset": -3,
            "order_by": "created_at DESC"
        }));
        let plan = handler
            .plan_query(QueryBuilder::new(Dialect::Postgres), &input)
            .unwrap();
        assert_eq!(
            plan.sql,
            "SELECT * FROM \"orders\" WHERE \"status\"::text = $1 ORDER BY created_at DESC LIMIT 100"
        );
        assert_eq!(plan.params, vec![QueryParam::from("paid")]);
    }

    #[test]
    fn test_query_input_rejects_nested_conditions() {
        let result: Result<QueryInput, _> = serde_json::from_value(json!({
            "database": "shop",
            "table": "orders",
            "conditions": {"status": {"$ne": "paid"}}
        }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_query_unknown_database() {
        let handler = handler(ToolSettings::default());
        let err = handler
            .query(input(json!({"database": "nope", "table": "orders"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[test]
    fn test_count_value_reads_first_column() {
        let mysql_row = json!({"COUNT(*)": 42}).as_object().cloned();
        assert_eq!(count_value(mysql_row.as_ref()).unwrap(), 42);

        let pg_row = json!({"count": 7}).as_object().cloned();
        assert_eq!(count_value(pg_row.as_ref()).unwrap(), 7);

        let text_row = json!({"count": "9"}).as_object().cloned();
        assert_eq!(count_value(text_row.as_ref()).unwrap(), 9);

        assert!(count_value(None).is_err());
    }
}
