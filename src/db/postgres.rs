//! PostgreSQL repository.
//!
//! `information_schema` columns use domain types (`sql_identifier`,
//! `character_data`) that the driver will not decode as text, so every
//! catalog column is cast with `::text`.

use crate::db::catalog::{
    column_comments_from_result, columns_from_result, foreign_keys_from_result,
    split_bound_table, split_qualified, table_comment_from_result, table_names_from_result,
    usable_schema,
};
use crate::db::dialect::Dialect;
use crate::db::params::bind_all_postgres;
use crate::db::repository::{
    ExecuteOptions, Repository, collect_rows, fetch_limit, process_rows, timeout_error,
};
use crate::error::DbResult;
use crate::models::{
    ColumnDescriptor, ForeignKeyDescriptor, QueryParam, QueryPlan, QueryResult, TableMetadata,
};
use futures_util::StreamExt;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Schema searched when the caller names none.
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone)]
pub struct PostgresRepository {
    id: String,
    pool: PgPool,
    database: Option<String>,
    default_timeout: Duration,
}

impl PostgresRepository {
    pub fn new(
        id: impl Into<String>,
        pool: PgPool,
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
    ) -> DbResult<Vec<PgRow>> {
        let limit = fetch_limit(row_limit);
        let rows_future = if plan.params.is_empty() {
            use sqlx::Executor;
            self.pool.fetch(plan.sql.as_str()).take(limit).collect::<Vec<_>>()
        } else {
            bind_all_postgres(&plan.sql, &plan.params)
                .fetch(&self.pool)
                .take(limit)
                .collect::<Vec<_>>()
        };

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }
}

impl Repository for PostgresRepository {
    fn name(&self) -> &str {
        &self.id
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
        let result = self
            .execute(&list_tables_plan(schema), ExecuteOptions::default())
            .await?;
        table_names_from_result(&result)
    }

    async fn describe_table(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let plan = describe_table_plan(table, schema)?;
        let result = self.execute(&plan, ExecuteOptions::default()).await?;
        columns_from_result(&result)
    }

    async fn list_foreign_keys(&self, table: &str) -> DbResult<Vec<ForeignKeyDescriptor>> {
        let result = self
            .execute(&foreign_keys_plan(table), ExecuteOptions::default())
            .await?;
        foreign_keys_from_result(&result)
    }

    async fn table_metadata(&self, table: &str, schema: Option<&str>) -> DbResult<TableMetadata> {
        let comment_plan = table_comment_plan(table, schema)?;
        let columns_plan = column_comments_plan(table, schema)?;

        let table_comment = match self.execute(&comment_plan, ExecuteOptions::default()).await {
            Ok(result) => table_comment_from_result(&result),
            Err(e) => {
                warn!(database = %self.id, table = %table, error = %e, "Table comment lookup failed");
                None
            }
        };
        let result = self
            .execute(&columns_plan, ExecuteOptions::default())
            .await?;

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

/// Base tables in `schema`, falling back to `public`.
///
/// The schema is always a bind value, so the plan text never varies.
pub fn list_tables_plan(schema: Option<&str>) -> QueryPlan {
    let schema = usable_schema(schema, DEFAULT_SCHEMA).unwrap_or(DEFAULT_SCHEMA);
    QueryPlan::new(
        "SELECT table_name::text AS table_name FROM information_schema.tables \
         WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name",
        vec![QueryParam::from(schema)],
    )
}

/// Columns of `table`, in ordinal order, with primary-key membership.
pub fn describe_table_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;
    Ok(QueryPlan::new(
        "SELECT c.column_name::text AS column_name, \
         c.data_type::text AS data_type, \
         c.is_nullable::text AS is_nullable, \
         c.column_default::text AS column_default, \
         CASE WHEN pk.column_name IS NULL THEN 'NO' ELSE 'YES' END AS is_primary_key \
         FROM information_schema.columns c \
         LEFT JOIN ( \
             SELECT kcu.table_schema, kcu.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
         ) pk ON pk.table_schema = c.table_schema \
             AND pk.table_name = c.table_name \
             AND pk.column_name = c.column_name \
         WHERE c.table_name = $1 AND c.table_schema = $2 \
         ORDER BY c.ordinal_position",
        vec![
            QueryParam::from(table),
            QueryParam::from(schema.unwrap_or(DEFAULT_SCHEMA)),
        ],
    ))
}

pub fn table_comment_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;
    Ok(QueryPlan::new(
        "SELECT obj_description(c.oid, 'pg_class') AS table_comment \
         FROM pg_catalog.pg_class c \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         WHERE c.relname = $1 AND n.nspname = $2",
        vec![
            QueryParam::from(table),
            QueryParam::from(schema.unwrap_or(DEFAULT_SCHEMA)),
        ],
    ))
}

/// Column types, keys and comments of `table`, in ordinal order.
///
/// Primary-key columns report `PRI` as their key, as MySQL does.
pub fn column_comments_plan(table: &str, schema: Option<&str>) -> DbResult<QueryPlan> {
    let (schema, table) = split_qualified(table, schema)?;
    Ok(QueryPlan::new(
        "SELECT c.column_name::text AS column_name, \
         c.data_type::text AS data_type, \
         c.is_nullable::text AS is_nullable, \
         c.column_default::text AS column_default, \
         CASE WHEN pk.column_name IS NULL THEN NULL ELSE 'PRI' END AS column_key, \
         col_description(pc.oid, c.ordinal_position::int) AS column_comment \
         FROM information_schema.columns c \
         LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = c.table_schema \
         LEFT JOIN pg_catalog.pg_class pc \
           ON pc.relnamespace = n.oid AND pc.relname = c.table_name \
         LEFT JOIN ( \
             SELECT kcu.table_schema, kcu.table_name, kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
              AND tc.table_name = kcu.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
         ) pk ON pk.table_schema = c.table_schema \
             AND pk.table_name = c.table_name \
             AND pk.column_name = c.column_name \
         WHERE c.table_name = $1 AND c.table_schema = $2 \
         ORDER BY c.ordinal_position",
        vec![
            QueryParam::from(table),
            QueryParam::from(schema.unwrap_or(DEFAULT_SCHEMA)),
        ],
    ))
}

/// Outgoing foreign keys of `table`; the name is only ever a bind value.
///
/// A bare name matches in every schema; `crm.orders` only in `crm`.
pub fn foreign_keys_plan(table: &str) -> QueryPlan {
    let (schema, table) = split_bound_table(table);
    let mut sql = String::from(
        "SELECT tc.constraint_name::text AS constraint_name, \
         tc.table_name::text AS table_name, \
         kcu.column_name::text AS column_name, \
         ccu.table_name::text AS referenced_table_name, \
         ccu.column_name::text AS referenced_column_name \
         FROM information_schema.table_constraints AS tc \
         JOIN information_schema.key_column_usage AS kcu \
           ON tc.constraint_name = kcu.constraint_name \
          AND tc.table_schema = kcu.table_schema \
         JOIN information_schema.constraint_column_usage AS ccu \
           ON ccu.constraint_name = tc.constraint_name \
          AND ccu.table_schema = tc.table_schema \
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = $1",
    );
    let mut params = vec![QueryParam::from(table)];
    if let Some(schema) = schema {
        sql.push_str(" AND tc.table_schema = $2");
        params.push(QueryParam::from(schema));
    }
    sql.push_str(" ORDER BY tc.constraint_name");
    QueryPlan::new(sql, params)
}
