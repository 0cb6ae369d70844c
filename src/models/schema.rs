//! Catalog data models.
//!
//! Column and foreign-key descriptors returned by the repositories, plus the
//! per-table summary assembled by the introspection tool.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Engine type name (e.g., "varchar", "integer")
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    /// Set the column default as reported by the catalog.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }
}

/// One column of a foreign-key constraint.
///
/// Composite keys produce one descriptor per column, all sharing the same
/// `constraint_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKeyDescriptor {
    pub constraint_name: String,
    pub source_table: String,
    pub source_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKeyDescriptor {
    /// Human-readable `source.col -> target.col` form used in prompts and logs.
    pub fn edge(&self) -> String {
        format!(
            "{}.{} -> {}.{}",
            self.source_table, self.source_column, self.referenced_table, self.referenced_column
        )
    }
}

/// Structure of one table as reported by `db_introspect`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSummary {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Names of the primary key columns, in column order
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableSummary {
    pub fn new(
        table_name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        foreign_keys: Vec<ForeignKeyDescriptor>,
    ) -> Self {
        let primary_key = primary_key_columns(&columns);
        let description = (!foreign_keys.is_empty())
            .then(|| format!("Has {} foreign key(s)", foreign_keys.len()));
        Self {
            table_name: table_name.into(),
            columns,
            primary_key,
            foreign_keys,
            description,
        }
    }
}

/// A column as documented in the catalog, including its comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnComment {
    pub name: String,
    /// Full engine type, e.g. `varchar(64)` on MySQL
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// MySQL `COLUMN_KEY` (`PRI`, `UNI`, `MUL`); absent on PostgreSQL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Table and column comments for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_comment: Option<String>,
    pub columns: Vec<ColumnComment>,
}

/// Primary key column names in column order.
pub fn primary_key_columns(columns: &[ColumnDescriptor]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(table: &str, column: &str, target: &str) -> ForeignKeyDescriptor {
        ForeignKeyDescriptor {
            constraint_name: format!("fk_{table}_{column}"),
            source_table: table.to_string(),
            source_column: column.to_string(),
            referenced_table: target.to_string(),
            referenced_column: "id".to_string(),
        }
    }

    #[test]
    fn test_column_descriptor_builder() {
        let col = ColumnDescriptor::new("id", "bigint", false)
            .with_primary_key(true)
            .with_default("nextval('users_id_seq'::regclass)");
        assert!(col.is_primary_key);
        assert!(!col.nullable);
        assert_eq!(
            col.default_value.as_deref(),
            Some("nextval('users_id_seq'::regclass)")
        );
    }

    #[test]
    fn test_column_descriptor_omits_missing_default() {
        let json = serde_json::to_value(ColumnDescriptor::new("name", "varchar", true)).unwrap();
        assert!(json.get("default_value").is_none());
        assert_eq!(json["nullable"], true);
    }

    #[test]
    fn test_foreign_key_edge() {
        assert_eq!(
            fk("orders", "user_id", "users").edge(),
            "orders.user_id -> users.id"
        );
    }

    #[test]
    fn test_table_summary_collects_primary_key_and_description() {
        let columns = vec![
            ColumnDescriptor::new("order_id", "int", false).with_primary_key(true),
            ColumnDescriptor::new("line_no", "int", false).with_primary_key(true),
            ColumnDescriptor::new("sku", "varchar", true),
        ];
        let summary = TableSummary::new(
            "order_lines",
            columns,
            vec![fk("order_lines", "order_id", "orders")],
        );
        assert_eq!(summary.primary_key, vec!["order_id", "line_no"]);
        assert_eq!(summary.description.as_deref(), Some("Has 1 foreign key(s)"));
    }

    #[test]
    fn test_table_summary_without_foreign_keys() {
        let summary = TableSummary::new("tags", vec![ColumnDescriptor::new("id", "int", false)], vec![]);
        assert!(summary.description.is_none());
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("foreign_keys").is_none());
    }
}
