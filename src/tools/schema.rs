//! Schema tools: `list_databases`, `db_table_list`, `db_describe_table` and
//! `db_metadata`.

use crate::cache::CacheManager;
use crate::db::catalog::qualified_table;
use crate::db::{ConnectionManager, ConnectionSummary, Dialect, QueryBuilder, Repository};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnComment, ColumnDescriptor, ConditionMap, ForeignKeyDescriptor, QueryPlan,
    TableMetadata, primary_key_columns,
};
use crate::tools::query::count_value;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Output for the list_databases tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListDatabasesOutput {
    /// Configured SQL instances, sorted by id
    pub databases: Vec<ConnectionSummary>,
    pub count: usize,
    /// Configured Redis instance ids, for the redis_* tools
    pub redis: Vec<String>,
}

/// Input for the db_table_list tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Schema to list. MySQL defaults to the connected database, PostgreSQL to `public`
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub tables: Vec<String>,
    pub count: usize,
}

/// Input for the db_describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Table name, optionally schema-qualified
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// Also run COUNT(*) on the table. Default: false
    #[serde(default)]
    pub include_row_count: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub database: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// Input for the db_metadata tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MetadataInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Table name, optionally schema-qualified
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MetadataOutput {
    pub database: String,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_comment: Option<String>,
    pub columns: Vec<ColumnComment>,
    pub column_count: usize,
    /// Set when the catalog could not be read; `columns` is then empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetadataOutput {
    fn new(database: String, table: String, metadata: TableMetadata) -> Self {
        Self {
            database,
            table,
            table_comment: metadata.table_comment,
            column_count: metadata.columns.len(),
            columns: metadata.columns,
            warning: None,
            error: None,
        }
    }

    /// Empty metadata carrying the lookup failure.
    fn unavailable(database: String, table: String, err: &DbError) -> Self {
        Self {
            warning: Some("Metadata retrieval failed or not supported".to_string()),
            error: Some(err.to_string()),
            ..Self::new(database, table, TableMetadata::default())
        }
    }
}

/// Handler for schema tools.
pub struct SchemaToolHandler {
    connection_manager: Arc<ConnectionManager>,
    cache_manager: CacheManager,
}

impl SchemaToolHandler {
    pub fn new(connection_manager: Arc<ConnectionManager>, cache_manager: CacheManager) -> Self {
        Self {
            connection_manager,
            cache_manager,
        }
    }

    pub async fn list_databases(&self) -> ListDatabasesOutput {
        let databases = self.connection_manager.list().await;
        let redis = self.cache_manager.ids().await;
        info!(
            databases = databases.len(),
            redis = redis.len(),
            "list_databases"
        );
        ListDatabasesOutput {
            count: databases.len(),
            databases,
            redis,
        }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let schema = input
            .schema
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        info!(database = %input.database, schema = ?schema, "db_table_list");

        let tables = repo.list_tables(schema.as_deref()).await?;
        Ok(ListTablesOutput {
            database: input.database,
            schema,
            count: tables.len(),
            tables,
        })
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<DescribeTableOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let schema = input.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());

        info!(
            database = %input.database,
            table = %input.table,
            include_row_count = input.include_row_count,
            "db_describe_table"
        );

        // Columns, foreign keys and the row count all read the same table
        let target = qualified_table(&input.table, schema)?;
        let columns = repo.describe_table(&target, None).await?;
        let foreign_keys = repo.list_foreign_keys(&target).await?;

        let row_count = if input.include_row_count {
            let plan = row_count_plan(repo.dialect(), &target)?;
            let row = repo.execute_one(&plan, None).await?;
            Some(count_value(row.as_ref())?)
        } else {
            None
        };

        Ok(DescribeTableOutput {
            database: input.database,
            table: input.table,
            primary_key: primary_key_columns(&columns),
            columns,
            foreign_keys,
            row_count,
        })
    }

    pub async fn metadata(&self, input: MetadataInput) -> DbResult<MetadataOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let schema = input.schema.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let target = qualified_table(&input.table, schema)?;

        info!(database = %input.database, table = %target, "db_metadata");

        Ok(match repo.table_metadata(&target, None).await {
            Ok(metadata) => MetadataOutput::new(input.database, input.table, metadata),
            Err(e) => {
                warn!(database = %input.database, table = %target, error = %e, "Failed to retrieve metadata");
                MetadataOutput::unavailable(input.database, input.table, &e)
            }
        })
    }
}

fn row_count_plan(dialect: Dialect, target: &str) -> DbResult<QueryPlan> {
    QueryBuilder::new(dialect).build_count(target, &ConditionMap::new())
}

/// The last segment of a possibly schema-qualified table name, unquoted.
///
/// The foreign-key catalog query matches on the plain table name.
pub(crate) fn bare_table_name(table: &str) -> &str {
    let table = table.trim();
    let last = table.rsplit('.').next().unwrap_or(table);
    last.trim_matches(|c| c == '`' || c == '"')
}
