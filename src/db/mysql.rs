//! MySQL / MariaDB repository.
//!
//! Catalog columns are wrapped in `CONVERT(.. USING utf8mb4)` because MySQL 8
//! reports several `information_schema` columns as binary strings.

use crate::db::catalog::{
    column_comments_from_result, columns_from_result, foreign_keys_from_result,
    split_bound_table, split_qualified, table_comment_from_result, table_names_from_result,
    usable_schema,
};
use crate::db::dialect::Dialect;
use crate::db::params::bind_all_mysql;
use crate::db::repository::{
    ExecuteOptions, Repository, collect_rows, fetch_limit, process_rows, timeout_error,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDescriptor, ForeignKeyDescriptor, QueryParam, QueryPlan, QueryResult, TableMetadata,
};
use futures_util::StreamExt;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MySqlRepository {
    id: String,
    pool: MySqlPool,
    database: Option<String>,
    default_timeout: Duration,
}

impl MySqlRepository {
    pub fn new(
        id: impl Into<String>,
        pool: MySqlPool,
        database: Option<String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            pool,
            database,
            default_timeout,
        }
    }

    async fn fetch_rows(
        &self,
        plan: &QueryPlan,
        row_limit: Option<u32>,
        query_timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>> {
        let limit = fetch_limit(row_limit);
        // Unparameterized statements go through the text protocol
        let rows_future = if plan.params.is_empty() {
            use sqlx::Executor;
            self.pool.fetch(plan.sql.as_str()).take(limit).collect::<Vec<_>>()
        } else {
            bind_all_mysql(&plan.sql, &plan.params)
                .fetch(&self.pool)
                .take(limit)
                .collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    async fn run_catalog(&self, plan: &QueryPlan) -> DbResult<QueryResult> {
        debug!(database = %self.id, sql = %plan.sql, "Running catalog query");
        self.execute(plan, ExecuteOptions::default()).await
    }
}

impl Repository for MySqlRepository {
    fn name(&self) -> &str {
        &self.id
    }

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn execute(&self, plan: &QueryPlan, options: ExecuteOptions) -> DbResult<QueryResult> {
        let start = Instant::now();
        let query_timeout = options.timeout.unwrap_or(self.default_timeout);
        debug!(
            database = %self.id,
            sql = %plan.sql,
            params = plan.params.len(),
            limit = ?options.row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        let rows = self
            .fetch_rows(plan, options.row_limit, query_timeout)
            .await?;
        Ok(process_rows(rows, options.row_limit, start))
    }

    async fn list_tables(&self, schema: Option<&str>) -> DbResult<Vec<String>> {
        let result = self.run_catalog(&list_tables_plan(schema)).await?;
        table_names_from_result(&result)
    }

    async fn describe_table(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let plan = describe_table_plan(table, schema)?;
        let result = self.run_catalog(&plan).await?;
        columns_from_result(&result)
    }

    async fn list_foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyDescriptor>> {
        let result = self.run_catalog(&foreign_keys_plan(table)).await?;
        foreign_keys_from_result(&result)
    }

    async fn table_metadata(&self, table: &str, schema: Option<&str>) -> DbResult<TableMetadata> {
        let comment_plan = table_comment_plan(table, schema)?;
        let columns_plan = column_comments_plan(table, schema)?;

        let table_comment = match self.run_catalog(&comment_plan).await {
            Ok(result) => table_comment_from_result(&result),
            Err(e) => {
                warn!(database = %self.id, table = %table, error = %e, "Table comment lookup failed");
                None
            }
        };
        let result = self.run_catalog(&columns_plan).await?;

        Ok(TableMetadata {
            table_comment,
            columns: column_comments_from_result(&result)?,
        })
    }

    async fn ping(&self) -> DbResult<()> {
        match timeout(self.default_timeout, sqlx::query("SELECT 1").execute(&self.pool)).await {
            Ok(result) => result.map(|_| ()).map_err(Into::into),
            Err(_) => Err(timeout_error("ping", self.default_timeout)),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Base tables in `schema`, or in `DATABASE()` when no usable schema is given.
pub fn list_tables_plan(schema: Option<&str>) -> QueryPlan {
    const SELECT: &str = "SELECT CONVERT(table_name USING utf8mb4) AS table_name \
        FROM information_schema.tables";

    match usable_schema(schema, "DATABASE()") {
        Some(schema) => QueryPlan::new(
            format!(
                "{SELECT} WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name"
            ),
            vec![QueryParam::from(schema)],
        ),
        None => QueryPlan::raw(format!(
            "{SELECT} WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
        )),
    }
}

/// Columns of `table`, in ordinal order.
///
/// `shop.orders` is read as table `orders` in schema `shop` when no schema
/// is passed separately.
pub fn describe_table_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;

    let mut sql = String::from(
        "SELECT CONVERT(column_name USING utf8mb4) AS column_name, \
         CONVERT(data_type USING utf8mb4) AS data_type, \
         CONVERT(is_nullable USING utf8mb4) AS is_nullable, \
         CONVERT(column_default USING utf8mb4) AS column_default, \
         IF(column_key = 'PRI', 'YES', 'NO') AS is_primary_key \
         FROM information_schema.columns WHERE table_name = ?",
    );
    let mut params = vec![QueryParam::from(table)];
    push_schema_filter(&mut sql, &mut params, schema);
    sql.push_str(" ORDER BY ordinal_position");

    Ok(QueryPlan::new(sql, params))
}

/// Append the schema filter for a catalog lookup on `information_schema`.
fn push_schema_filter(sql: &mut String, params: &mut Vec<QueryParam>, schema: Option<&str>) {
    match schema {
        Some(schema) => {
            sql.push_str(" AND table_schema = ?");
            params.push(QueryParam::from(schema));
        }
        None => sql.push_str(" AND table_schema = DATABASE()"),
    }
}

pub fn table_comment_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;

    let mut sql = String::from(
        "SELECT CONVERT(table_comment USING utf8mb4) AS table_comment \
         FROM information_schema.tables WHERE table_name = ?",
    );
    let mut params = vec![QueryParam::from(table)];
    push_schema_filter(&mut sql, &mut params, schema);

    Ok(QueryPlan::new(sql, params))
}

/// Column types, keys and comments of `table`, in ordinal order.
pub fn column_comments_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;

    let mut sql = String::from(
        "SELECT CONVERT(column_name USING utf8mb4) AS column_name, \
         CONVERT(column_type USING utf8mb4) AS data_type, \
         CONVERT(is_nullable USING utf8mb4) AS is_nullable, \
         CONVERT(column_default USING utf8mb4) AS column_default, \
         CONVERT(column_key USING utf8mb4) AS column_key, \
         CONVERT(column_comment USING utf8mb4) AS column_comment \
         FROM information_schema.columns WHERE table_name = ?",
    );
    let mut params = vec![QueryParam::from(table)];
    push_schema_filter(&mut sql, &mut params, schema);
    sql.push_str(" ORDER BY ordinal_position");

    Ok(QueryPlan::new(sql, params))
}

/// Outgoing foreign keys of `table`; the name is only ever a bind value.
///
/// `crm.orders` looks in schema `crm` instead of `DATABASE()`.
pub fn foreign_keys_plan(table: &str) -> QueryPlan {
    let (schema, table) = split_bound_table(table);
    let mut params = Vec::with_capacity(2);
    let schema_filter = match schema {
        Some(schema) => {
            params.push(QueryParam::from(schema));
            "table_schema = ?"
        }
        None => "table_schema = DATABASE()",
    };
    params.push(QueryParam::from(table));

    QueryPlan::new(
        format!(
            "SELECT CONVERT(constraint_name USING utf8mb4) AS constraint_name, \
             CONVERT(table_name USING utf8mb4) AS table_name, \
             CONVERT(column_name USING utf8mb4) AS column_name, \
             CONVERT(referenced_table_name USING utf8mb4) AS referenced_table_name, \
             CONVERT(referenced_column_name USING utf8mb4) AS referenced_column_name \
             FROM information_schema.key_column_usage \
             WHERE {schema_filter} AND table_name = ? \
             AND referenced_table_name IS NOT NULL \
             ORDER BY constraint_name, ordinal_position"
        ),
        params,
    )
}
