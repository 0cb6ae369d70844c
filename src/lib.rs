//! DB Bridge MCP library.
//!
//! MCP tools that let AI assistants read MySQL and PostgreSQL databases
//! through an injection-safe query builder, plus basic Redis key access.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::DbService;
