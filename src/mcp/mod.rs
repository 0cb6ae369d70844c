//! MCP protocol surface: the rmcp service that routes tool calls.

pub mod service;

pub use service::DbService;
