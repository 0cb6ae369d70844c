//! SQL dialect differences: identifier quoting and placeholder syntax.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL dialect a query is built for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Backtick quoting, `?` placeholders.
    #[default]
    MySql,
    /// Double-quote quoting, `$n` placeholders.
    Postgres,
}

impl Dialect {
    /// Resolve a driver name. Anything other than `postgres` is MySQL.
    pub fn from_driver(driver: &str) -> Self {
        if driver.trim().eq_ignore_ascii_case("postgres") {
            Self::Postgres
        } else {
            Self::MySql
        }
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Postgres => '"',
        }
    }

    /// Quote an already-validated identifier.
    ///
    /// Dotted names are quoted per segment so `shop.orders` addresses the
    /// `orders` table in schema `shop`.
    pub fn quote(&self, identifier: &str) -> String {
        let q = self.quote_char();
        identifier
            .split('.')
            .map(|segment| format!("{q}{segment}{q}"))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Left-hand side used when `quoted_column` is compared with a string
    /// parameter.
    ///
    /// PostgreSQL receives bound strings as `text`, which has no `=` or
    /// `LIKE` against `date`, `uuid`, enum and other non-text columns, so the
    /// column's text form is compared instead. MySQL coerces by itself.
    pub fn string_operand(&self, quoted_column: &str) -> String {
        match self {
            Self::MySql => quoted_column.to_string(),
            Self::Postgres => format!("{quoted_column}::text"),
        }
    }

    /// Placeholder for the parameter at 1-based `position`.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::MySql => "?".to_string(),
            Self::Postgres => format!("${position}"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.driver_name())
    }
}
