//! The `db_analytics` tool: one allow-listed aggregate, optionally grouped.

use crate::config::ToolSettings;
use crate::db::identifier::unquote;
use crate::db::{ConnectionManager, ExecuteOptions, QueryBuilder, Repository, is_valid_identifier};
use crate::error::DbResult;
use crate::models::{ConditionMap, QueryParam};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AnalyticsInput {
    /// Database instance name from list_databases
    pub database: String,
    pub table: String,
    /// Column to aggregate. Use `*` with COUNT to count rows
    pub column: String,
    /// One of COUNT, SUM, AVG, MIN, MAX (case-insensitive)
    pub function: String,
    /// Optional column to group by
    #[serde(default)]
    pub group_by: Option<String>,
    /// Equality filters combined with AND. Values are never treated as LIKE patterns here
    #[serde(default)]
    pub conditions: ConditionMap,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AnalyticsOutput {
    pub database: String,
    pub table: String,
    pub column: String,
    /// Normalized function name
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    /// Rows with a `result` value, plus the group column when grouped
    pub results: Vec<serde_json::Map<String, JsonValue>>,
    pub result_count: usize,
    /// True when more groups existed than the analytics row cap
    pub truncated: bool,
    pub query: String,
    pub params: Vec<QueryParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct AnalyticsToolHandler {
    connection_manager: Arc<ConnectionManager>,
    settings: Arc<ToolSettings>,
}

impl AnalyticsToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, settings: Arc<ToolSettings>) -> Self {
        Self {
            connection_manager,
            settings,
        }
    }

    pub async fn analyze(&self, input: AnalyticsInput) -> DbResult<AnalyticsOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let group_by = input
            .group_by
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty());

        let plan = QueryBuilder::new(repo.dialect()).build_aggregation(
            &input.table,
            &input.column,
            &input.function,
            &input.conditions,
            group_by.unwrap_or(""),
        )?;

        let warning = group_by
            .filter(|g| !is_valid_identifier(unquote(g)))
            .map(|g| {
                warn!(group_by = %g, "Ignoring invalid GROUP BY column");
                format!("group_by '{}' is not a valid column name and was ignored", g)
            });
        let group_by = group_by
            .filter(|g| is_valid_identifier(unquote(g)))
            .map(String::from);

        info!(
            database = %input.database,
            table = %input.table,
            function = %input.function,
            group_by = ?group_by,
            "db_analytics"
        );

        let options = ExecuteOptions::with_limit(self.settings.analytics_max_rows)
            .timeout(self.settings.analytics_timeout);
        let result = repo.execute(&plan, options).await?;

        Ok(AnalyticsOutput {
            database: input.database,
            table: input.table,
            column: input.column,
            function: input.function.trim().to_uppercase(),
            group_by,
            result_count: result.row_count(),
            truncated: result.truncated,
            results: result.rows,
            query: plan.sql,
            params: plan.params,
            warning,
        })
    }
}
