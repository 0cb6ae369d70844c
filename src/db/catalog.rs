//! Helpers shared by the per-engine catalog lookups.
//!
//! Catalog queries alias their columns to the same names on every engine,
//! so turning result rows into descriptors happens once, here.

use crate::db::identifier::{IdentifierRole, unquote, validate_identifier};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnComment, ColumnDescriptor, ForeignKeyDescriptor, QueryResult};
use serde_json::{Map, Value};
use tracing::warn;

type Row = Map<String, Value>;

/// A caller schema that passed validation, or `None` for the engine default.
///
/// Unlike table names, an unusable schema here is not an error: the lookup
/// falls back to `default_label` and logs the rejected value.
pub(crate) fn usable_schema<'a>(schema: Option<&'a str>, default_label: &str) -> Option<&'a str> {
    let schema = unquote(schema?);
    if schema.is_empty() {
        return None;
    }
    match validate_identifier(schema, IdentifierRole::Schema) {
        Ok(valid) => Some(valid),
        Err(_) => {
            warn!(schema = %schema, fallback = default_label, "Ignoring invalid schema name");
            None
        }
    }
}

/// Validate a table (and optional schema) for a catalog lookup.
///
/// A dotted table such as `shop.orders` supplies the schema itself when none
/// is passed separately.
pub(crate) fn split_qualified<'a>(
    table: &'a str,
    schema: Option<&'a str>,
) -> DbResult<(Option<&'a str>, &'a str)> {
    let table = validate_identifier(table, IdentifierRole::Table)?;
    let schema = match schema.map(str::trim).filter(|s| !s.is_empty()) {
        Some(schema) => Some(validate_identifier(schema, IdentifierRole::Schema)?),
        None => None,
    };

    match (schema, table.split_once('.')) {
        (None, Some((prefix, name))) if !prefix.is_empty() && !name.is_empty() => {
            Ok((Some(prefix), name))
        }
        _ => Ok((schema, table)),
    }
}

/// Validated `schema.table` (or bare `table`) naming one catalog target.
pub(crate) fn qualified_table(table: &str, schema: Option<&str>) -> DbResult<String> {
    let (schema, table) = split_qualified(table, schema)?;
    Ok(match schema {
        Some(schema) => format!("{schema}.{table}"),
        None => table.to_string(),
    })
}

/// Split a table name that is only ever bound, never spliced, on its last dot.
pub(crate) fn split_bound_table(table: &str) -> (Option<&str>, &str) {
    match table.trim().rsplit_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table.trim()),
    }
}

pub(crate) fn table_names_from_result(result: &QueryResult) -> DbResult<Vec<String>> {
    result
        .rows
        .iter()
        .map(|row| required_text(row, "table_name"))
        .collect()
}

pub(crate) fn columns_from_result(result: &QueryResult) -> DbResult<Vec<ColumnDescriptor>> {
    result
        .rows
        .iter()
        .map(|row| {
            let column = ColumnDescriptor::new(
                required_text(row, "column_name")?,
                required_text(row, "data_type")?,
                is_yes(row, "is_nullable"),
            )
            .with_primary_key(is_yes(row, "is_primary_key"));
            Ok(match optional_text(row, "column_default") {
                Some(default) => column.with_default(default),
                None => column,
            })
        })
        .collect()
}

pub(crate) fn foreign_keys_from_result(
    result: &QueryResult,
) -> DbResult<Vec<ForeignKeyDescriptor>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(ForeignKeyDescriptor {
                constraint_name: required_text(row, "constraint_name")?,
                source_table: required_text(row, "table_name")?,
                source_column: required_text(row, "column_name")?,
                referenced_table: required_text(row, "referenced_table_name")?,
                referenced_column: required_text(row, "referenced_column_name")?,
            })
        })
        .collect()
}

/// Table comment from the first row; engines report "no comment" as NULL or ''.
pub(crate) fn table_comment_from_result(result: &QueryResult) -> Option<String> {
    result
        .rows
        .first()
        .and_then(|row| optional_text(row, "table_comment"))
        .filter(|comment| !comment.is_empty())
}

pub(crate) fn column_comments_from_result(result: &QueryResult) -> DbResult<Vec<ColumnComment>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(ColumnComment {
                name: required_text(row, "column_name")?,
                data_type: required_text(row, "data_type")?,
                nullable: is_yes(row, "is_nullable"),
                default_value: optional_text(row, "column_default"),
                key: optional_text(row, "column_key").filter(|k| !k.is_empty()),
                comment: optional_text(row, "column_comment").filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

fn optional_text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn required_text(row: &Row, key: &str) -> DbResult<String> {
    optional_text(row, key)
        .ok_or_else(|| DbError::internal(format!("Catalog row is missing '{}'", key)))
}

fn is_yes(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("YES"),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}
