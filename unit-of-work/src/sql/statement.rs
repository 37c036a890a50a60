//! Parameterized statement rendering
//!
//! Every value reaches the database as a bound parameter; only validated,
//! quoted identifiers and integer window bounds are written into the SQL text.
//! JSON nulls render as the `NULL` keyword so that no parameter type has to
//! be guessed for them.

use serde_json::Value;

use super::dialect::Dialect;
use crate::entity::{Entity, EntityField};
use crate::pagination::Window;
use crate::repository::{
    FieldUpdates, FieldValue, FilterCondition, FilterOperator, OrderDirection, RepositoryError,
    RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlParam {
    /// Convert a JSON value; `None` means SQL `NULL`
    ///
    /// Arrays and objects are stored as their JSON text.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlParam>,
}

impl StatementBuilder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn push_identifier(&mut self, identifier: &str) -> RepositoryResult<()> {
        let quoted = self.dialect.quote(identifier)?;
        self.sql.push_str(&quoted);
        Ok(())
    }

    fn bind(&mut self, param: SqlParam) {
        self.params.push(param);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
    }

    fn bind_json(&mut self, value: &Value) {
        match SqlParam::from_json(value) {
            Some(param) => self.bind(param),
            None => self.push("NULL"),
        }
    }

    fn push_where(&mut self, conditions: &[FilterCondition]) -> RepositoryResult<()> {
        for (i, condition) in conditions.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            self.push_condition(condition)?;
        }
        Ok(())
    }

    fn push_condition(&mut self, condition: &FilterCondition) -> RepositoryResult<()> {
        let column = self.dialect.quote(condition.field)?;
        let value = &condition.value;

        match condition.operator {
            FilterOperator::Equal | FilterOperator::NotEqual if *value == FieldValue::Null => {
                self.push(&column);
                self.push(if condition.operator == FilterOperator::Equal {
                    " IS NULL"
                } else {
                    " IS NOT NULL"
                });
            }
            FilterOperator::NotEqual => {
                // NULL differs from every value
                self.push(&format!("({} <> ", column));
                self.bind_json(&value.to_json());
                self.push(&format!(" OR {} IS NULL)", column));
            }
            FilterOperator::Contains => {
                self.push(&column);
                self.push(" LIKE ");
                self.bind(SqlParam::Text(format!("%{}%", escape_like(&value.to_string()))));
                self.push(" ESCAPE '\\'");
            }
            FilterOperator::In => {
                let items: Vec<Value> = match value.to_json() {
                    Value::Array(items) => items,
                    scalar => vec![scalar],
                };
                if items.is_empty() {
                    self.push("1 = 0");
                } else {
                    self.push(&column);
                    self.push(" IN (");
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.bind_json(item);
                    }
                    self.push(")");
                }
            }
            FilterOperator::IsNull => {
                self.push(&column);
                self.push(" IS NULL");
            }
            FilterOperator::IsNotNull => {
                self.push(&column);
                self.push(" IS NOT NULL");
            }
            FilterOperator::Equal
            | FilterOperator::GreaterThan
            | FilterOperator::GreaterThanOrEqual
            | FilterOperator::LessThan
            | FilterOperator::LessThanOrEqual => {
                self.push(&column);
                self.push(&format!(" {} ", condition.operator));
                self.bind_json(&value.to_json());
            }
        }
        Ok(())
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// `SELECT` the given columns (`*` when `None`) from `table`
pub fn select(
    dialect: Dialect,
    table: &str,
    columns: Option<&[&str]>,
    conditions: &[FilterCondition],
    ordering: Option<(&str, OrderDirection)>,
    window: Option<Window>,
) -> RepositoryResult<SqlStatement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("SELECT ");
    match columns {
        Some(columns) => {
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push_identifier(column)?;
            }
        }
        None => builder.push("*"),
    }
    builder.push(" FROM ");
    builder.push_identifier(table)?;
    builder.push_where(conditions)?;

    if let Some((column, direction)) = ordering {
        builder.push(" ORDER BY ");
        builder.push_identifier(column)?;
        builder.push(&format!(" {}", direction));
    }
    if let Some(window) = window {
        builder.push(&format!(" LIMIT {} OFFSET {}", window.limit, window.offset));
    }
    Ok(builder.finish())
}

/// `SELECT COUNT(*) AS "total"` over the matching rows
pub fn count(
    dialect: Dialect,
    table: &str,
    conditions: &[FilterCondition],
) -> RepositoryResult<SqlStatement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("SELECT COUNT(*) AS \"total\" FROM ");
    builder.push_identifier(table)?;
    builder.push_where(conditions)?;
    Ok(builder.finish())
}

/// `INSERT` one row
pub fn insert<'a>(
    dialect: Dialect,
    table: &str,
    values: impl IntoIterator<Item = (&'a str, &'a Value)>,
) -> RepositoryResult<SqlStatement> {
    let values: Vec<_> = values.into_iter().collect();
    let mut builder = StatementBuilder::new(dialect);
    builder.push("INSERT INTO ");
    builder.push_identifier(table)?;
    builder.push(" (");
    for (i, (column, _)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_identifier(column)?;
    }
    builder.push(") VALUES (");
    for (i, (_, value)) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.bind_json(value);
    }
    builder.push(")");
    Ok(builder.finish())
}

/// `DELETE` every matching row
pub fn delete(
    dialect: Dialect,
    table: &str,
    conditions: &[FilterCondition],
) -> RepositoryResult<SqlStatement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("DELETE FROM ");
    builder.push_identifier(table)?;
    builder.push_where(conditions)?;
    Ok(builder.finish())
}

/// A single `UPDATE` assigning `updates` to every row whose `field` equals `value`
///
/// This is the one place partial updates become SQL. Column names come from
/// the entity's declared fields and each assigned value is a parameter.
pub fn update_statement<T: Entity>(
    dialect: Dialect,
    table: &str,
    updates: &FieldUpdates<T>,
    field: T::Field,
    value: &FieldValue,
) -> RepositoryResult<SqlStatement> {
    if updates.is_empty() {
        return Err(RepositoryError::new(
            RepositoryOperation::Update,
            RepositoryErrorKind::InvalidField,
            "Update has no assignments",
        )
        .with_entity(T::entity_name()));
    }

    let mut builder = StatementBuilder::new(dialect);
    builder.push("UPDATE ");
    builder.push_identifier(table)?;
    builder.push(" SET ");
    for (i, (assigned, new_value)) in updates.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_identifier(assigned.name())?;
        builder.push(" = ");
        builder.bind_json(new_value);
    }
    builder.push_where(&[FilterCondition::new(
        field.name(),
        FilterOperator::Equal,
        value.clone(),
    )])?;
    Ok(builder.finish())
}
