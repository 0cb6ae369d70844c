//! Database layer.
//!
//! - Identifier validation and dialect quoting
//! - The injection-safe query builder
//! - Repositories for MySQL and PostgreSQL, plus their catalog lookups
//! - Connection pool management
//! - Row decoding

pub mod catalog;
pub mod dialect;
pub mod identifier;
#[macro_use]
pub mod macros;
pub mod mysql;
pub mod params;
pub mod pool;
pub mod postgres;
pub mod query_builder;
pub mod repository;
pub mod types;

pub use dialect::Dialect;
pub use identifier::{IdentifierRole, is_valid_identifier, is_valid_order_by};
pub use mysql::MySqlRepository;
pub use pool::{ConnectionManager, ConnectionSummary};
pub use postgres::PostgresRepository;
pub use query_builder::{AggregateFunction, QueryBuilder};
pub use repository::{DbRepository, ExecuteOptions, Repository};
