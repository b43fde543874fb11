/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// Owned SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    Gt(&'static str, Value),
    Lt(&'static str, Value),
    Ge(&'static str, Value),
    Le(&'static str, Value),
    In(&'static str, Vec<Value>),
    Like(&'static str, String),
    IsNull(&'static str),
    NotNull(&'static str),
    /// Produced by the `*_opt` constructors when the value is unknown; the
    /// predicate is dropped instead of comparing against NULL.
    Skip,
}

impl Filter {
    pub fn eq_opt(column: &'static str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => Filter::Eq(column, value.into()),
            None => Filter::Skip,
        }
    }

    pub fn like_opt(column: &'static str, value: Option<String>) -> Self {
        match value {
            Some(value) => Filter::Like(column, value),
            None => Filter::Skip,
        }
    }
}

#[derive(Debug, Default)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Value>,
}

pub fn build_where(filters: impl IntoIterator<Item = Filter>) -> WhereClause {
    let mut clause = WhereClause::default();

    for filter in filters {
        let (column, op, value) = match filter {
            Filter::Eq(column, value) => (column, "=", Some(value)),
            Filter::Ne(column, value) => (column, "!=", Some(value)),
            Filter::Gt(column, value) => (column, ">", Some(value)),
            Filter::Lt(column, value) => (column, "<", Some(value)),
            Filter::Ge(column, value) => (column, ">=", Some(value)),
            Filter::Le(column, value) => (column, "<=", Some(value)),
            Filter::Like(column, value) => (column, "LIKE", Some(Value::Text(value))),
            Filter::In(column, values) => {
                if values.is_empty() {
                    continue;
                }
                clause.join();
                clause.sql.push_str(column);
                clause.sql.push_str(" IN (");
                for (pos, value) in values.into_iter().enumerate() {
                    if pos > 0 {
                        clause.sql.push_str(", ");
                    }
                    clause.push_param(value);
                }
                clause.sql.push(')');
                continue;
            }
            Filter::IsNull(column) => {
                clause.join();
                clause.sql.push_str(column);
                clause.sql.push_str(" IS NULL");
                continue;
            }
            Filter::NotNull(column) => {
                clause.join();
                clause.sql.push_str(column);
                clause.sql.push_str(" IS NOT NULL");
                continue;
            }
            Filter::Skip => continue,
        };

        if let Some(value) = value {
            clause.join();
            clause.sql.push_str(column);
            clause.sql.push(' ');
            clause.sql.push_str(op);
            clause.sql.push(' ');
            clause.push_param(value);
        }
    }

    clause
}

impl WhereClause {
    fn join(&mut self) {
        self.sql
            .push_str(if self.params.is_empty() && self.sql.is_empty() {
                " WHERE "
            } else {
                " AND "
            });
    }

    fn push_param(&mut self, value: Value) {
        self.params.push(value);
        self.sql.push_str(&format!("${}", self.params.len()));
    }

    pub fn as_params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|value| value as &(dyn ToSql + Sync))
            .collect()
    }
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Text(value) => value.to_sql(ty, out),
            Value::Int(value) => value.to_sql(ty, out),
            Value::Bool(value) => value.to_sql(ty, out),
            Value::Timestamp(value) => value.to_sql(ty, out),
            Value::Json(value) => value.to_sql(ty, out),
            Value::Null => Ok(IsNull::Yes),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_shapes() {
        let clause = build_where([
            Filter::Eq("domain", "carmarket.lv".into()),
            Filter::Skip,
            Filter::In("status", vec!["active".into(), "disabled".into()]),
            Filter::IsNull("alias"),
        ]);
        assert_eq!(
            clause.sql,
            " WHERE domain = $1 AND status IN ($2, $3) AND alias IS NULL"
        );
        assert_eq!(clause.params.len(), 3);
    }

    #[test]
    fn unknown_values_are_skipped() {
        let clause = build_where([Filter::eq_opt("owner_user_id", None::<String>)]);
        assert!(clause.sql.is_empty());
        assert!(clause.params.is_empty());
    }

    #[test]
    fn empty_in_list_is_dropped() {
        let clause = build_where([Filter::In("id", Vec::new())]);
        assert!(clause.sql.is_empty());
    }
}
