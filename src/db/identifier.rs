//! Identifier and ORDER BY validation.
//!
//! Table, column and schema names end up as literal SQL text (bind
//! parameters cannot stand in for structure), so they must pass these
//! allow-list checks before they are quoted and used.

use crate::error::{DbError, DbResult};
use serde::Serialize;
use std::fmt;

/// What an identifier names, reported back when validation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierRole {
    Table,
    Column,
    Schema,
}

impl fmt::Display for IdentifierRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Column => write!(f, "column"),
            Self::Schema => write!(f, "schema"),
        }
    }
}

/// Whether `s` is safe to use as a SQL identifier.
///
/// Non-empty and made only of ASCII letters, digits, `_` and `.`
/// (the dot allows `schema.table`). Every dot-separated segment must be
/// non-empty, so `.users` and `a..b` are rejected. No length cap is applied
/// here.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Whether `s` is an acceptable ORDER BY clause body.
///
/// Each comma-separated part must be an identifier optionally followed by
/// `ASC`/`DESC` tokens (case-insensitive). One bad part rejects the whole
/// clause.
pub fn is_valid_order_by(s: &str) -> bool {
    s.split(',').all(|part| {
        let mut tokens = part.split_whitespace();
        let Some(column) = tokens.next() else {
            return false;
        };
        is_valid_identifier(column)
            && tokens.all(|t| t.eq_ignore_ascii_case("ASC") || t.eq_ignore_ascii_case("DESC"))
    })
}

/// Strip one layer of surrounding identifier quotes.
///
/// Callers sometimes send names already quoted (`` `users` `` or `"users"`);
/// the bare name is what gets validated.
pub fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    for quote in ['`', '"'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

/// Unquote and validate `raw`, failing with an error naming its role.
pub fn validate_identifier(raw: &str, role: IdentifierRole) -> DbResult<&str> {
    let name = unquote(raw);
    if is_valid_identifier(name) {
        Ok(name)
    } else {
        Err(DbError::invalid_identifier(role, raw))
    }
}
