//! Injection-safe construction of SELECT, COUNT and aggregate queries.
//!
//! Caller-supplied values only ever land in [`QueryPlan::params`]. The SQL
//! text contains nothing caller-controlled except identifiers that passed
//! [`is_valid_identifier`] and ORDER BY clauses that passed
//! [`is_valid_order_by`].

use crate::db::dialect::Dialect;
use crate::db::identifier::{
    IdentifierRole, is_valid_identifier, is_valid_order_by, unquote, validate_identifier,
};
use crate::error::{DbError, DbResult};
use crate::models::{ConditionMap, QueryParam, QueryPlan};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Aggregate functions accepted by [`QueryBuilder::build_aggregation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COUNT" => Ok(Self::Count),
            "SUM" => Ok(Self::Sum),
            "AVG" => Ok(Self::Avg),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            _ => Err(DbError::invalid_aggregate_function(s)),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition value is compared against its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matching {
    /// `LIKE` for strings containing `%` or `_`, `=` otherwise.
    Pattern,
    /// Always `=`.
    Equality,
}

/// Stateless query builder bound to one dialect.
///
/// Cheap to copy and safe to share across tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryBuilder {
    dialect: Dialect,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Builder for a driver name; unknown drivers get the MySQL dialect.
    pub fn for_driver(driver: &str) -> Self {
        Self::new(Dialect::from_driver(driver))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// `SELECT * FROM <table> [WHERE ...] [ORDER BY ...] [LIMIT n] [OFFSET m]`
    ///
    /// An `order_by` that fails validation is dropped rather than rejected.
    /// `limit`/`offset` of zero omit their clause.
    pub fn build_select(
        &self,
        table: &str,
        conditions: &ConditionMap,
        limit: u32,
        offset: u32,
        order_by: &str,
    ) -> DbResult<QueryPlan> {
        let mut sql = format!("SELECT * FROM {}", self.quoted(table, IdentifierRole::Table)?);
        let mut params = Vec::with_capacity(conditions.len());
        self.push_where(&mut sql, &mut params, conditions, Matching::Pattern)?;

        let order_by = order_by.trim();
        if !order_by.is_empty() {
            if is_valid_order_by(order_by) {
                sql.push_str(" ORDER BY ");
                sql.push_str(order_by);
            } else {
                warn!(order_by = %order_by, "Dropping invalid ORDER BY clause");
            }
        }

        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(QueryPlan::new(sql, params))
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE ...]` with the same WHERE rules as
    /// [`build_select`](Self::build_select).
    pub fn build_count(&self, table: &str, conditions: &ConditionMap) -> DbResult<QueryPlan> {
        let mut sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.quoted(table, IdentifierRole::Table)?
        );
        let mut params = Vec::with_capacity(conditions.len());
        self.push_where(&mut sql, &mut params, conditions, Matching::Pattern)?;
        Ok(QueryPlan::new(sql, params))
    }

    /// `SELECT [<group_by>, ]<FUNC>(<column>) AS result FROM <table> [WHERE ...] [GROUP BY <group_by>]`
    ///
    /// The function is checked against the allow-list before anything else.
    /// Conditions always compare with `=`. An invalid `group_by` is ignored.
    pub fn build_aggregation(
        &self,
        table: &str,
        column: &str,
        function: &str,
        conditions: &ConditionMap,
        group_by: &str,
    ) -> DbResult<QueryPlan> {
        let function: AggregateFunction = function.parse()?;
        let table = self.quoted(table, IdentifierRole::Table)?;
        let target = if function == AggregateFunction::Count && column.trim() == "*" {
            "*".to_string()
        } else {
            self.quoted(column, IdentifierRole::Column)?
        };

        let group_by = unquote(group_by);
        let group_by = is_valid_identifier(group_by).then(|| self.dialect.quote(group_by));

        let mut sql = String::from("SELECT ");
        if let Some(group) = &group_by {
            sql.push_str(group);
            sql.push_str(", ");
        }
        sql.push_str(&format!("{function}({target}) AS result FROM {table}"));

        let mut params = Vec::with_capacity(conditions.len());
        self.push_where(&mut sql, &mut params, conditions, Matching::Equality)?;

        if let Some(group) = &group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }

        Ok(QueryPlan::new(sql, params))
    }

    fn quoted(&self, raw: &str, role: IdentifierRole) -> DbResult<String> {
        validate_identifier(raw, role).map(|name| self.dialect.quote(name))
    }

    fn push_where(
        &self,
        sql: &mut String,
        params: &mut Vec<QueryParam>,
        conditions: &ConditionMap,
        matching: Matching,
    ) -> DbResult<()> {
        if conditions.is_empty() {
            return Ok(());
        }

        let mut clauses = Vec::with_capacity(conditions.len());
        for (column, value) in conditions {
            let column = self.quoted(column, IdentifierRole::Column)?;
            let column = match value {
                QueryParam::String(_) => self.dialect.string_operand(&column),
                _ => column,
            };
            let operator = match matching {
                Matching::Pattern if value.is_like_pattern() => "LIKE",
                _ => "=",
            };
            params.push(value.clone());
            clauses.push(format!(
                "{column} {operator} {}",
                self.dialect.placeholder(params.len())
            ));
        }

        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
        Ok(())
    }
}
