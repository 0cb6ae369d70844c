//! Data models shared by the query builder, repositories and tools.

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType, mask_credentials};
pub use query::{ColumnMetadata, ConditionMap, QueryParam, QueryPlan, QueryResult};
pub use schema::{
    ColumnComment, ColumnDescriptor, ForeignKeyDescriptor, TableMetadata, TableSummary,
    primary_key_columns,
};
