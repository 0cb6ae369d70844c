//! MCP service implementation using rmcp.
//!
//! `DbService` registers every tool with the rmcp router and hands each call
//! to the matching handler in [`crate::tools`].

use crate::cache::CacheManager;
use crate::config::ToolSettings;
use crate::db::ConnectionManager;
use crate::tools::analytics::{AnalyticsInput, AnalyticsOutput, AnalyticsToolHandler};
use crate::tools::cache::{
    CacheToolHandler, RedisGetInput, RedisGetOutput, RedisScanInput, RedisScanOutput,
    RedisSetInput, RedisSetOutput,
};
use crate::tools::insights::{
    InsightsToolHandler, IntrospectInput, IntrospectOutput, RelationshipsInput,
    RelationshipsOutput, SemanticSummaryInput, SemanticSummaryOutput,
};
use crate::tools::query::{
    CountInput, CountOutput, PreviewInput, PreviewOutput, QueryInput, QueryOutput,
    QueryToolHandler,
};
use crate::tools::schema::{
    DescribeTableInput, DescribeTableOutput, ListDatabasesOutput, ListTablesInput,
    ListTablesOutput, MetadataInput, MetadataOutput, SchemaToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    connection_manager: Arc<ConnectionManager>,
    cache_manager: CacheManager,
    settings: Arc<ToolSettings>,
    tool_router: ToolRouter<Self>,
}

impl DbService {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        cache_manager: CacheManager,
        settings: ToolSettings,
    ) -> Self {
        Self {
            connection_manager,
            cache_manager,
            settings: Arc::new(settings),
            tool_router: Self::tool_router(),
        }
    }

    /// Trim the `database` argument and reject it when empty.
    fn validate_database(&self, provided: &str) -> Result<String, McpError> {
        validate_instance("database", provided)
    }

    /// Trim the `redis` argument and reject it when empty.
    fn validate_redis(&self, provided: &str) -> Result<String, McpError> {
        validate_instance("redis", provided)
    }

    /// Close every SQL pool and drop every Redis connection.
    pub async fn shutdown(&self) {
        self.connection_manager.close_all().await;
        self.cache_manager.close_all().await;
    }

    fn query_handler(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.connection_manager.clone(), self.settings.clone())
    }

    fn schema_handler(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.connection_manager.clone(), self.cache_manager.clone())
    }

    fn insights_handler(&self) -> InsightsToolHandler {
        InsightsToolHandler::new(
            self.connection_manager.clone(),
            self.cache_manager.clone(),
            self.settings.clone(),
        )
    }

    fn cache_handler(&self) -> CacheToolHandler {
        CacheToolHandler::new(self.cache_manager.clone(), self.settings.clone())
    }
}

fn validate_instance(field: &str, provided: &str) -> Result<String, McpError> {
    let trimmed = provided.trim();
    if trimmed.is_empty() {
        Err(McpError::invalid_params(
            format!(
                "{} is required. Call list_databases first to get available instance names.",
                field
            ),
            None,
        ))
    } else {
        Ok(trimmed.to_string())
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "List configured SQL database instances (id, type, database name) and Redis instance names.\nCall this first: every other tool takes one of these names."
    )]
    async fn list_databases(&self) -> Json<ListDatabasesOutput> {
        Json(self.schema_handler().list_databases().await)
    }

    #[tool(
        description = "Read rows from a table. SQL is built server-side from the arguments; raw SQL is not accepted.\nconditions: column -> value filters joined with AND. String values containing % or _ use LIKE, everything else uses =.\norder_by: `column [ASC|DESC]` list; anything else is ignored.\nSet dry_run=true to preview the SQL and parameters without running it."
    )]
    async fn db_query(
        &self,
        Parameters(input): Parameters<QueryInput>,
    ) -> Result<Json<QueryOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.query_handler()
            .query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Count rows in a table, with the same condition rules as db_query.")]
    async fn db_count(
        &self,
        Parameters(input): Parameters<CountInput>,
    ) -> Result<Json<CountOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.query_handler()
            .count(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List base tables. MySQL defaults to the connected database, PostgreSQL to the `public` schema."
    )]
    async fn db_table_list(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.schema_handler()
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Show the first few rows of a table.")]
    async fn db_table_preview(
        &self,
        Parameters(input): Parameters<PreviewInput>,
    ) -> Result<Json<PreviewOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.query_handler()
            .preview(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describe a table: columns with types, nullability, defaults and primary key flags, plus outgoing foreign keys.\nSet include_row_count=true to also count rows."
    )]
    async fn db_describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.schema_handler()
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Table and column comments, with each column's type, nullability and key.\nReturns empty columns and a warning when the catalog cannot be read."
    )]
    async fn db_metadata(
        &self,
        Parameters(input): Parameters<MetadataInput>,
    ) -> Result<Json<MetadataOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.schema_handler()
            .metadata(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Map foreign-key relationships for one table or the whole database.\nReturns the graph, a relationship count and a ready-made analysis prompt. Results may be cached; set refresh=true to rebuild."
    )]
    async fn db_relationships(
        &self,
        Parameters(input): Parameters<RelationshipsInput>,
    ) -> Result<Json<RelationshipsOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.insights_handler()
            .relationships(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Snapshot the structure of every table: columns, primary key and foreign keys.\nResults may be cached; set refresh=true to rebuild."
    )]
    async fn db_introspect(
        &self,
        Parameters(input): Parameters<IntrospectInput>,
    ) -> Result<Json<IntrospectOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.insights_handler()
            .introspect(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Sample a few rows of a table and return them with its columns and a ready-made prompt for a business summary of the data."
    )]
    async fn db_semantic_summary(
        &self,
        Parameters(input): Parameters<SemanticSummaryInput>,
    ) -> Result<Json<SemanticSummaryOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        self.insights_handler()
            .semantic_summary(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Run one aggregate (COUNT, SUM, AVG, MIN, MAX) over a column, optionally grouped by another column.\nConditions compare with = only. Use column `*` with COUNT to count rows."
    )]
    async fn db_analytics(
        &self,
        Parameters(input): Parameters<AnalyticsInput>,
    ) -> Result<Json<AnalyticsOutput>, McpError> {
        let mut input = input;
        input.database = self.validate_database(&input.database)?;
        AnalyticsToolHandler::new(self.connection_manager.clone(), self.settings.clone())
            .analyze(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Get a string value from Redis.")]
    async fn redis_get(
        &self,
        Parameters(input): Parameters<RedisGetInput>,
    ) -> Result<Json<RedisGetOutput>, McpError> {
        let mut input = input;
        input.redis = self.validate_redis(&input.redis)?;
        self.cache_handler()
            .get(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Set a string value in Redis, with an optional expiry in seconds.")]
    async fn redis_set(
        &self,
        Parameters(input): Parameters<RedisSetInput>,
    ) -> Result<Json<RedisSetOutput>, McpError> {
        let mut input = input;
        input.redis = self.validate_redis(&input.redis)?;
        self.cache_handler()
            .set(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List Redis keys matching a glob pattern (default `*`) using incremental SCAN.\nStops at the server's key cap and reports `limited` when it does."
    )]
    async fn redis_scan(
        &self,
        Parameters(input): Parameters<RedisScanInput>,
    ) -> Result<Json<RedisScanOutput>, McpError> {
        let mut input = input;
        input.redis = self.validate_redis(&input.redis)?;
        self.cache_handler()
            .scan(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-bridge-mcp".to_owned(),
                title: Some("DB Bridge MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only tools for MySQL and PostgreSQL databases, plus Redis key access.\n\
                \n\
                ## Workflow\n\
                1. Call `list_databases` to get database and Redis instance names\n\
                2. Pass a database name as `database` to the db_* tools, a Redis name as `redis` to the redis_* tools\n\
                3. Explore with `db_table_list`, `db_describe_table` or `db_introspect` before querying\n\
                4. `db_metadata` reads table and column comments; `db_semantic_summary` samples rows for a summary prompt\n\
                \n\
                ## Querying\n\
                - SQL is never accepted. Describe the query with `table`, `conditions`, `order_by`, `limit` and `offset`\n\
                - String condition values containing % or _ are matched with LIKE\n\
                - Use `dry_run: true` on `db_query` to see the generated SQL first\n\
                - `db_analytics` runs COUNT, SUM, AVG, MIN or MAX with an optional group_by\n\
                \n\
                ## Errors\n\
                Unknown instance names list the available ones. Invalid table or column names are rejected \
                with the rule they broke."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> DbService {
        DbService::new(
            Arc::new(ConnectionManager::new()),
            CacheManager::new(),
            ToolSettings::default(),
        )
    }

    #[test]
    fn test_validate_database_trims_whitespace() {
        let service = create_test_service();
        assert_eq!(service.validate_database("  shop  ").unwrap(), "shop");
    }

    #[test]
    fn test_validate_database_rejects_blank() {
        let service = create_test_service();
        for blank in ["", "   "] {
            let err = service.validate_database(blank).unwrap_err();
            assert!(err.to_string().contains("database is required"));
        }
    }

    #[test]
    fn test_validate_redis_rejects_blank() {
        let service = create_test_service();
        let err = service.validate_redis(" ").unwrap_err();
        assert!(err.to_string().contains("redis is required"));
        assert_eq!(service.validate_redis("sessions").unwrap(), "sessions");
    }

    #[test]
    fn test_all_tools_registered() {
        let service = create_test_service();
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "db_analytics",
                "db_count",
                "db_describe_table",
                "db_introspect",
                "db_metadata",
                "db_query",
                "db_relationships",
                "db_semantic_summary",
                "db_table_list",
                "db_table_preview",
                "list_databases",
                "redis_get",
                "redis_scan",
                "redis_set",
            ]
        );
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-bridge-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("list_databases"));
    }
}
