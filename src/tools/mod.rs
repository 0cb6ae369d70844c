//! MCP tool implementations.
//!
//! - `query`: `db_query`, `db_count`, `db_table_preview`
//! - `schema`: `list_databases`, `db_table_list`, `db_describe_table`, `db_metadata`
//! - `analytics`: `db_analytics`
//! - `insights`: `db_relationships`, `db_introspect`, `db_semantic_summary`
//! - `cache`: `redis_get`, `redis_set`, `redis_scan`

pub mod analytics;
pub mod cache;
pub mod insights;
pub mod query;
pub mod schema;

pub use analytics::{AnalyticsInput, AnalyticsOutput, AnalyticsToolHandler};
pub use cache::{
    CacheToolHandler, RedisGetInput, RedisGetOutput, RedisScanInput, RedisScanOutput,
    RedisSetInput, RedisSetOutput,
};
pub use insights::{
    InsightsToolHandler, IntrospectInput, IntrospectOutput, RelationshipsInput,
    RelationshipsOutput, SemanticSummaryInput, SemanticSummaryOutput,
};
pub use query::{
    CountInput, CountOutput, PreviewInput, PreviewOutput, QueryInput, QueryOutput,
    QueryToolHandler,
};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListDatabasesOutput, ListTablesInput,
    ListTablesOutput, MetadataInput, MetadataOutput, SchemaToolHandler,
};

use crate::db::is_valid_order_by;

/// Message for an ORDER BY that the query builder will drop.
pub(crate) fn order_by_warning(order_by: Option<&str>) -> Option<String> {
    let order_by = order_by?.trim();
    if order_by.is_empty() || is_valid_order_by(order_by) {
        return None;
    }
    Some(format!(
        "order_by '{}' was ignored: use `column [ASC|DESC]` separated by commas",
        order_by
    ))
}
