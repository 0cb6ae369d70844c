//! Error types for the DB Bridge MCP Server.
//!
//! Every variant carries enough context for an AI assistant to understand
//! what was rejected and how to correct the next request.

use crate::db::identifier::IdentifierRole;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(
        "Invalid {role} identifier '{value}': use ASCII letters, digits and '_', with '.' only between non-empty name parts"
    )]
    InvalidIdentifier { role: IdentifierRole, value: String },

    #[error(
        "Invalid aggregate function '{function}': expected one of COUNT, SUM, AVG, MIN, MAX"
    )]
    InvalidAggregateFunction { function: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("{kind} '{name}' not found. {hint}")]
    NotFound {
        kind: String,
        name: String,
        hint: String,
    },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid identifier error for the given role.
    pub fn invalid_identifier(role: IdentifierRole, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            role,
            value: value.into(),
        }
    }

    /// Create an invalid aggregate function error.
    pub fn invalid_aggregate_function(function: impl Into<String>) -> Self {
        Self::InvalidAggregateFunction {
            function: function.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a not-found error for a named instance, listing what is available.
    ///
    /// Used for both SQL databases and Redis instances so every tool reports
    /// unknown names the same way.
    pub fn not_found(kind: &str, name: impl Into<String>, available: &[String]) -> Self {
        let hint = if available.is_empty() {
            format!("No {}s are configured.", kind.to_lowercase())
        } else {
            let mut sorted = available.to_vec();
            sorted.sort();
            format!("Available: {}", sorted.join(", "))
        };
        Self::NotFound {
            kind: kind.to_string(),
            name: name.into(),
            hint,
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::NotFound { hint, .. } => Some(hint),
            Self::InvalidIdentifier { .. } => Some(
                "Use a plain table/column name such as `orders` or `shop.orders`; call db_table_list or db_describe_table to see valid names",
            ),
            Self::InvalidAggregateFunction { .. } => {
                Some("Use one of COUNT, SUM, AVG, MIN, MAX (case-insensitive)")
            }
            Self::Timeout { .. } => {
                Some("Narrow the conditions, lower the limit, or raise the timeout")
            }
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the table and column names with db_describe_table",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found in result: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<redis::RedisError> for DbError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            DbError::connection(
                format!("Redis connection failed: {}", err),
                "Check that the Redis server is running and reachable",
            )
        } else {
            DbError::cache(err.to_string())
        }
    }
}

/// Result type alias for database and cache operations.
pub type DbResult<T> = Result<T, DbError>;

fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::InvalidIdentifier { .. }
            | DbError::InvalidAggregateFunction { .. }
            | DbError::InvalidInput { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            DbError::NotFound { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            // Engine message is passed through verbatim
            DbError::Database {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::Timeout { .. }
            | DbError::Cache { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
