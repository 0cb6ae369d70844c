//! Insight tools: `db_relationships`, `db_introspect` and `db_semantic_summary`.
//!
//! Relationships and introspection walk the catalog table by table. When
//! insight caching is enabled their serialized result is stored in the first
//! Redis instance; cache failures are logged and never fail the call.

use crate::cache::CacheManager;
use crate::config::ToolSettings;
use crate::db::identifier::{IdentifierRole, validate_identifier};
use crate::db::{ConnectionManager, DbRepository, ExecuteOptions, QueryBuilder, Repository};
use crate::error::DbResult;
use crate::models::{ColumnDescriptor, ConditionMap, ForeignKeyDescriptor, TableSummary};
use crate::tools::schema::bare_table_name;
use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Foreign keys per source table. Tables without any are left out.
pub type RelationshipGraph = BTreeMap<String, Vec<ForeignKeyDescriptor>>;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RelationshipsInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Restrict the graph to this table's outgoing foreign keys
    #[serde(default)]
    pub table: Option<String>,
    /// Ignore any cached result. Default: false
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipsOutput {
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_filter: Option<String>,
    pub relationships: RelationshipGraph,
    pub relationship_count: usize,
    /// RFC 3339 time the graph was built
    pub cached_at: String,
    /// Ready-made prompt asking for an analysis of the graph
    pub llm_prompt: String,
    /// True when served from the Redis cache
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IntrospectInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Ignore any cached result. Default: false
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IntrospectOutput {
    pub database: String,
    pub table_count: usize,
    pub tables: Vec<TableSummary>,
    /// RFC 3339 time the snapshot was taken
    pub cached_at: String,
    /// Seconds the snapshot stays cached, when caching is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<u64>,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SemanticSummaryInput {
    /// Database instance name from list_databases
    pub database: String,
    /// Table to sample, optionally schema-qualified
    pub table: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SemanticSummaryOutput {
    pub database: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub sample_count: usize,
    pub sample_data: Vec<Map<String, JsonValue>>,
    /// Ready-made prompt asking for a business summary of the table
    pub llm_prompt: String,
    pub description: String,
}

const SEMANTIC_SUMMARY_DESCRIPTION: &str = "This result includes an LLM prompt template for \
    generating semantic summaries. MCP clients can use this prompt to call their LLM and get \
    business-meaningful insights.";

pub fn relationships_cache_key(database: &str, table: Option<&str>) -> String {
    match table {
        Some(table) => format!("relationships:{}:{}", database, table),
        None => format!("relationships:{}", database),
    }
}

pub fn introspection_cache_key(database: &str) -> String {
    format!("introspection:{}", database)
}

pub fn count_relationships(graph: &RelationshipGraph) -> usize {
    graph.values().map(Vec::len).sum()
}

/// Prompt asking an LLM to explain the data model behind `graph`.
pub fn relationship_prompt(database: &str, graph: &RelationshipGraph) -> String {
    let graph_json = serde_json::to_string_pretty(graph).unwrap_or_else(|_| "{}".to_string());
    format!(
        "# Task: Analyze Database Relationships\n\n\
         You are analyzing the relationships (foreign keys) in the \"{database}\" database to understand the data model.\n\n\
         ## Relationship Graph:\n{graph_json}\n\n\
         ## Your Task:\n\
         Please analyze the foreign key relationships and provide:\n\n\
         1. **Entity Relationship Overview**: Describe the main entities and how they relate to each other\n\
         2. **Central Tables**: Identify which tables are most connected (hub tables)\n\
         3. **Data Flow**: Describe typical data flow patterns based on relationships\n\
         4. **Potential Issues**: Identify any missing relationships or potential design issues\n\
         5. **Query Recommendations**: Suggest useful JOIN queries based on these relationships\n\n\
         Please provide your response in a clear, structured format."
    )
}

/// One `  - name (type, NULL|NOT NULL)` line per column, primary keys marked.
fn prompt_columns(columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|col| {
            format!(
                "  - {} ({}, {}){}\n",
                col.name,
                col.data_type,
                if col.nullable { "NULL" } else { "NOT NULL" },
                if col.is_primary_key { " [PRIMARY KEY]" } else { "" }
            )
        })
        .collect()
}

/// Prompt asking an LLM to describe what `table` holds, from its columns and sample rows.
pub fn semantic_summary_prompt(
    table: &str,
    columns: &[ColumnDescriptor],
    samples: &[Map<String, JsonValue>],
) -> String {
    let sample_json = serde_json::to_string_pretty(samples).unwrap_or_else(|_| "[]".to_string());
    format!(
        "# Task: Generate a Semantic Summary of Database Table\n\n\
         You are analyzing a database table named \"{table}\" to provide business-meaningful insights.\n\n\
         ## Table Schema:\n\
         - Table Name: {table}\n\
         - Column Count: {column_count}\n\
         - Columns:\n{column_lines}\n\
         ## Sample Data ({sample_count} rows):\n{sample_json}\n\n\
         ## Your Task:\n\
         Please analyze the table schema and sample data, then provide:\n\n\
         1. **Business Purpose**: What is this table likely used for in the business context?\n\
         2. **Data Patterns**: What patterns or trends do you observe in the sample data?\n\
         3. **Key Insights**: What are the most important characteristics of this data?\n\
         4. **Data Quality**: Are there any potential data quality issues visible in the sample?\n\
         5. **Recommendations**: Any suggestions for data usage or further analysis?\n\n\
         Please provide your response in a clear, structured format.",
        column_count = columns.len(),
        column_lines = prompt_columns(columns),
        sample_count = samples.len(),
    )
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub struct InsightsToolHandler {
    connection_manager: Arc<ConnectionManager>,
    cache_manager: CacheManager,
    settings: Arc<ToolSettings>,
}

impl InsightsToolHandler {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        cache_manager: CacheManager,
        settings: Arc<ToolSettings>,
    ) -> Self {
        Self {
            connection_manager,
            cache_manager,
            settings,
        }
    }

    pub async fn relationships(&self, input: RelationshipsInput) -> DbResult<RelationshipsOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let table = match input.table.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(table) => {
                validate_identifier(table, IdentifierRole::Table)?;
                Some(bare_table_name(table).to_string())
            }
            None => None,
        };
        let cache_key = relationships_cache_key(&input.database, table.as_deref());

        info!(
            database = %input.database,
            table = ?table,
            refresh = input.refresh,
            "db_relationships"
        );

        if !input.refresh {
            if let Some(mut cached) = self.load::<RelationshipsOutput>(&cache_key).await {
                cached.cached = true;
                return Ok(cached);
            }
        }

        let tables = match &table {
            Some(table) => vec![table.clone()],
            None => repo.list_tables(None).await?,
        };

        let mut graph = RelationshipGraph::new();
        for name in tables {
            match repo.list_foreign_keys(&name).await {
                Ok(fks) if !fks.is_empty() => {
                    graph.insert(name, fks);
                }
                Ok(_) => {}
                Err(e) => warn!(table = %name, error = %e, "Failed to read foreign keys"),
            }
        }

        let output = RelationshipsOutput {
            relationship_count: count_relationships(&graph),
            llm_prompt: relationship_prompt(&input.database, &graph),
            database: input.database,
            table_filter: table,
            relationships: graph,
            cached_at: now_rfc3339(),
            cached: false,
        };
        self.store(&cache_key, &output).await;
        Ok(output)
    }

    pub async fn introspect(&self, input: IntrospectInput) -> DbResult<IntrospectOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let cache_key = introspection_cache_key(&input.database);

        info!(database = %input.database, refresh = input.refresh, "db_introspect");

        if !input.refresh {
            if let Some(mut cached) = self.load::<IntrospectOutput>(&cache_key).await {
                cached.cached = true;
                return Ok(cached);
            }
        }

        let tables = summarize_tables(&repo).await?;
        let output = IntrospectOutput {
            database: input.database,
            table_count: tables.len(),
            tables,
            cached_at: now_rfc3339(),
            cache_ttl: self
                .settings
                .cache_insights
                .then_some(self.settings.insights_cache_ttl_secs),
            cached: false,
        };
        self.store(&cache_key, &output).await;
        Ok(output)
    }

    pub async fn semantic_summary(
        &self,
        input: SemanticSummaryInput,
    ) -> DbResult<SemanticSummaryOutput> {
        let repo = self.connection_manager.get(&input.database).await?;
        let sample_size = self.settings.sample_size;
        let plan = QueryBuilder::new(repo.dialect()).build_select(
            &input.table,
            &ConditionMap::new(),
            sample_size,
            0,
            "",
        )?;

        info!(
            database = %input.database,
            table = %input.table,
            sample_size,
            "db_semantic_summary"
        );

        let columns = repo.describe_table(&input.table, None).await?;
        let samples = repo
            .execute(&plan, ExecuteOptions::with_limit(sample_size))
            .await?
            .rows;

        Ok(SemanticSummaryOutput {
            llm_prompt: semantic_summary_prompt(&input.table, &columns, &samples),
            database: input.database,
            table: input.table,
            columns,
            sample_count: samples.len(),
            sample_data: samples,
            description: SEMANTIC_SUMMARY_DESCRIPTION.to_string(),
        })
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.settings.cache_insights {
            return None;
        }
        let client = self.cache_manager.first().await?;
        match client.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, redis = %client.id(), "Insight cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable cached insight");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Insight cache read failed");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) {
        if !self.settings.cache_insights {
            return;
        }
        let Some(client) = self.cache_manager.first().await else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize insight for caching");
                return;
            }
        };
        if let Err(e) = client
            .set(key, &raw, Some(self.settings.insights_cache_ttl_secs))
            .await
        {
            warn!(key = %key, error = %e, "Failed to cache insight");
        }
    }
}

/// Columns and foreign keys for every table; tables that fail are skipped.
async fn summarize_tables(repo: &DbRepository) -> DbResult<Vec<TableSummary>> {
    let names = repo.list_tables(None).await?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let columns = match repo.describe_table(&name, None).await {
            Ok(columns) => columns,
            Err(e) => {
                warn!(table = %name, error = %e, "Failed to describe table");
                continue;
            }
        };
        let foreign_keys = match repo.list_foreign_keys(&name).await {
            Ok(fks) => fks,
            Err(e) => {
                warn!(table = %name, error = %e, "Failed to read foreign keys");
                Vec::new()
            }
        };
        tables.push(TableSummary::new(name, columns, foreign_keys));
    }
    Ok(tables)
}
