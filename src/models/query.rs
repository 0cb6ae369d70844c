//! Query-related data models.
//!
//! This module defines the scalar parameter type, condition maps, built
//! query plans and execution results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar bind value.
///
/// Deserialized from JSON booleans, numbers and strings. `null`, arrays and
/// objects do not match any variant and are rejected while parsing input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
}

impl QueryParam {
    /// String values containing `%` or `_` are matched with LIKE.
    pub fn is_like_pattern(&self) -> bool {
        matches!(self, Self::String(s) if s.contains('%') || s.contains('_'))
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Column name to value filters, combined with AND.
///
/// A `BTreeMap` so WHERE clauses and parameters are always emitted in the
/// same (sorted) order.
pub type ConditionMap = BTreeMap<String, QueryParam>;

/// SQL text plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct QueryPlan {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl QueryPlan {
    pub fn new(sql: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A plan with no bind parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "INT8", "VARCHAR")
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Rows returned by a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// True when more rows were available than the row limit
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            truncated: false,
            execution_time_ms,
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_deserializes_scalars() {
        let map: ConditionMap =
            serde_json::from_str(r#"{"active": true, "age": 30, "score": 1.5, "name": "ann"}"#)
                .unwrap();
        assert_eq!(map["active"], QueryParam::Bool(true));
        assert_eq!(map["age"], QueryParam::Int(30));
        assert_eq!(map["score"], QueryParam::Float(1.5));
        assert_eq!(map["name"], QueryParam::String("ann".to_string()));
    }

    #[test]
    fn test_query_param_rejects_non_scalars() {
        assert!(serde_json::from_str::<ConditionMap>(r#"{"a": null}"#).is_err());
        assert!(serde_json::from_str::<ConditionMap>(r#"{"a": [1, 2]}"#).is_err());
        assert!(serde_json::from_str::<ConditionMap>(r#"{"a": {"$gt": 1}}"#).is_err());
    }

    #[test]
    fn test_like_pattern_detection() {
        assert!(QueryParam::from("%phone%").is_like_pattern());
        assert!(QueryParam::from("john_doe").is_like_pattern());
        assert!(!QueryParam::from("active").is_like_pattern());
        assert!(!QueryParam::Int(5).is_like_pattern());
    }

    #[test]
    fn test_condition_map_iterates_sorted() {
        let mut map = ConditionMap::new();
        map.insert("zeta".to_string(), 1i64.into());
        map.insert("alpha".to_string(), 2i64.into());
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty(10);
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(!result.truncated);
    }
}
