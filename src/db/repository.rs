//! The repository contract every SQL backend implements.
//!
//! A repository executes a [`QueryPlan`] against one named instance, binding
//! the plan's parameters through the driver, and answers catalog questions
//! (tables, columns, foreign keys, comments) with dialect-specific SQL.

use crate::db::dialect::Dialect;
use crate::db::mysql::MySqlRepository;
use crate::db::postgres::PostgresRepository;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::impl_db_dispatch;
use crate::models::{
    ColumnDescriptor, DatabaseType, ForeignKeyDescriptor, QueryPlan, QueryResult, TableMetadata,
};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

/// Per-call execution limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Maximum rows to return; `None` reads everything
    pub row_limit: Option<u32>,
    /// Overrides the repository's default query timeout
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_limit(row_limit: u32) -> Self {
        Self {
            row_limit: Some(row_limit),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Query execution and catalog lookup against one SQL instance.
pub trait Repository: Send + Sync {
    /// Instance id the repository was registered under.
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Database name from the connection URL, if any.
    fn database(&self) -> Option<&str>;

    /// Run a plan with its parameters bound by the driver.
    ///
    /// Expiry of the timeout drops the in-flight driver future and yields
    /// [`DbError::Timeout`].
    fn execute(
        &self,
        plan: &QueryPlan,
        options: ExecuteOptions,
    ) -> impl Future<Output = DbResult<QueryResult>> + Send;

    /// Run a plan and return its first row, if any.
    fn execute_one(
        &self,
        plan: &QueryPlan,
        timeout: Option<Duration>,
    ) -> impl Future<Output = DbResult<Option<serde_json::Map<String, serde_json::Value>>>> + Send
    {
        async move {
            let options = ExecuteOptions {
                row_limit: Some(1),
                timeout,
            };
            let result = self.execute(plan, options).await?;
            Ok(result.rows.into_iter().next())
        }
    }

    /// Base table names in `schema`, or in the engine's default schema.
    fn list_tables(
        &self,
        schema: Option<&str>,
    ) -> impl Future<Output = DbResult<Vec<String>>> + Send;

    fn describe_table(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> impl Future<Output = DbResult<Vec<ColumnDescriptor>>> + Send;

    fn list_foreign_keys(
        &self,
        table: &str,
    ) -> impl Future<Output = DbResult<Vec<ForeignKeyDescriptor>>> + Send;

    /// Table and column comments alongside each column's type and key.
    ///
    /// A failed table-comment lookup is logged and reported as no comment.
    fn table_metadata(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> impl Future<Output = DbResult<TableMetadata>> + Send;

    fn ping(&self) -> impl Future<Output = DbResult<()>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A registered backend of either engine.
#[derive(Debug, Clone)]
pub enum DbRepository {
    MySql(MySqlRepository),
    Postgres(PostgresRepository),
}

impl DbRepository {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            Self::MySql(_) => DatabaseType::MySQL,
            Self::Postgres(_) => DatabaseType::PostgreSQL,
        }
    }
}

impl Repository for DbRepository {
    fn name(&self) -> &str {
        impl_db_dispatch!(self, repo => repo.name())
    }

    fn dialect(&self) -> Dialect {
        impl_db_dispatch!(self, repo => repo.dialect())
    }

    fn database(&self) -> Option<&str> {
        impl_db_dispatch!(self, repo => repo.database())
    }

    async fn execute(&self, plan: &QueryPlan, options: ExecuteOptions) -> DbResult<QueryResult> {
        impl_db_dispatch!(self, repo => repo.execute(plan, options).await)
    }

    async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        impl_db_dispatch!(self, repo => repo.list_tables(schema).await)
    }

    async fn describe_table(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        impl_db_dispatch!(self, repo => repo.describe_table(table, schema).await)
    }

    async fn list_foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyDescriptor>> {
        impl_db_dispatch!(self, repo => repo.list_foreign_keys(table).await)
    }

    async fn table_metadata(&self, table: &str, schema: Option<&str>) -> DbResult<TableMetadata> {
        impl_db_dispatch!(self, repo => repo.table_metadata(table, schema).await)
    }

    async fn ping(&self) -> DbResult<()> {
        impl_db_dispatch!(self, repo => repo.ping().await)
    }

    async fn close(&self) {
        impl_db_dispatch!(self, repo => repo.close().await)
    }
}

/// Rows to pull from the driver: one past the limit so truncation is visible.
pub(crate) fn fetch_limit(row_limit: Option<u32>) -> usize {
    row_limit.map_or(usize::MAX, |limit| limit as usize + 1)
}

/// Convert driver rows into a [`QueryResult`], trimming to `row_limit`.
pub(crate) fn process_rows<R: RowToJson>(
    rows: Vec<R>,
    row_limit: Option<u32>,
    start: Instant,
) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let Some(first) = rows.first() else {
        return QueryResult::empty(execution_time_ms);
    };

    let columns = first.column_metadata();
    let total_rows = rows.len();
    let keep = row_limit.map_or(total_rows, |limit| (limit as usize).min(total_rows));
    let truncated = total_rows > keep;

    if truncated {
        warn!(limit = keep, "Query result truncated");
    }

    QueryResult {
        columns,
        rows: rows.iter().take(keep).map(RowToJson::to_json_map).collect(),
        truncated,
        execution_time_ms,
    }
}

pub(crate) fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    results
        .into_iter()
        .map(|result| result.map_err(DbError::from))
        .collect()
}

pub(crate) fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}
