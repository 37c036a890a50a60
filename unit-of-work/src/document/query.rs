//! SurrealQL rendering
//!
//! The collection is always bound as `$table` and addressed through
//! `type::table` / `type::thing`. Field names are validated and
//! backtick-escaped; every value is a named binding.

use serde_json::{Map, Value};

use crate::entity::is_identifier;
use crate::pagination::Window;
use crate::repository::{
    FieldValue, FilterCondition, FilterOperator, OrderDirection, RepositoryError,
    RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};

/// A query plus its bindings
#[derive(Debug, Clone, PartialEq)]
pub struct SurrealQuery {
    pub text: String,
    pub bindings: Map<String, Value>,
}

struct QueryBuilder {
    text: String,
    bindings: Map<String, Value>,
}

impl QueryBuilder {
    fn new(table: &str) -> Self {
        let mut bindings = Map::new();
        bindings.insert("table".to_string(), Value::String(table.to_string()));
        Self {
            text: String::new(),
            bindings,
        }
    }

    fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn bind(&mut self, value: Value) -> String {
        let name = format!("p{}", self.bindings.len() - 1);
        self.bindings.insert(name.clone(), value);
        format!("${}", name)
    }

    fn push_where(&mut self, conditions: &[FilterCondition]) -> RepositoryResult<()> {
        for (i, condition) in conditions.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            let field = field(condition.field)?;
            let rendered = match condition.operator {
                FilterOperator::Equal if condition.value == FieldValue::Null => is_null(&field),
                FilterOperator::NotEqual if condition.value == FieldValue::Null => {
                    is_not_null(&field)
                }
                FilterOperator::IsNull => is_null(&field),
                FilterOperator::IsNotNull => is_not_null(&field),
                FilterOperator::Equal => format!("{} = {}", field, self.bind(condition.value.to_json())),
                FilterOperator::NotEqual => {
                    format!("{} != {}", field, self.bind(condition.value.to_json()))
                }
                FilterOperator::GreaterThan => {
                    format!("{} > {}", field, self.bind(condition.value.to_json()))
                }
                FilterOperator::GreaterThanOrEqual => {
                    format!("{} >= {}", field, self.bind(condition.value.to_json()))
                }
                FilterOperator::LessThan => {
                    format!("{} < {}", field, self.bind(condition.value.to_json()))
                }
                FilterOperator::LessThanOrEqual => {
                    format!("{} <= {}", field, self.bind(condition.value.to_json()))
                }
                FilterOperator::Contains => format!(
                    "{} CONTAINS {}",
                    field,
                    self.bind(Value::String(condition.value.to_string()))
                ),
                FilterOperator::In => {
                    let list = match condition.value.to_json() {
                        Value::Array(items) => Value::Array(items),
                        scalar => Value::Array(vec![scalar]),
                    };
                    format!("{} IN {}", field, self.bind(list))
                }
            };
            self.push(&rendered);
        }
        Ok(())
    }

    fn push_count(&mut self, conditions: &[FilterCondition]) -> RepositoryResult<()> {
        self.push("SELECT count() AS total FROM type::table($table)");
        self.push_where(conditions)?;
        self.push(" GROUP ALL;");
        Ok(())
    }

    fn finish(self) -> SurrealQuery {
        SurrealQuery {
            text: self.text,
            bindings: self.bindings,
        }
    }
}

fn is_null(field: &str) -> String {
    format!("({} = NONE OR {} = NULL)", field, field)
}

fn is_not_null(field: &str) -> String {
    format!("({} != NONE AND {} != NULL)", field, field)
}

/// Validate and backtick-escape a field name
pub fn field(name: &str) -> RepositoryResult<String> {
    if is_identifier(name) {
        Ok(format!("`{}`", name))
    } else {
        Err(RepositoryError::new(
            RepositoryOperation::FindAll,
            RepositoryErrorKind::InvalidField,
            format!("Invalid document field name '{}'", name),
        ))
    }
}

/// Documents matching `conditions`, without the record id
pub fn select(
    table: &str,
    conditions: &[FilterCondition],
    ordering: Option<(&str, OrderDirection)>,
    window: Option<Window>,
) -> RepositoryResult<SurrealQuery> {
    let mut builder = QueryBuilder::new(table);
    builder.push("SELECT * OMIT id FROM type::table($table)");
    builder.push_where(conditions)?;
    if let Some((name, direction)) = ordering {
        builder.push(&format!(" ORDER BY {} {}", field(name)?, direction));
    }
    if let Some(window) = window {
        builder.push(&format!(" LIMIT {} START {}", window.limit, window.offset));
    }
    builder.push(";");
    Ok(builder.finish())
}

/// `[{ total }]` over the matching documents; empty when nothing matches
pub fn count(table: &str, conditions: &[FilterCondition]) -> RepositoryResult<SurrealQuery> {
    let mut builder = QueryBuilder::new(table);
    builder.push_count(conditions)?;
    Ok(builder.finish())
}

/// Create one document under a fresh record key
pub fn create(table: &str, key: &str, document: Map<String, Value>) -> SurrealQuery {
    let mut builder = QueryBuilder::new(table);
    let key = builder.bind(Value::String(key.to_string()));
    let content = builder.bind(Value::Object(document));
    builder.push(&format!(
        "CREATE type::thing($table, {}) CONTENT {} RETURN NONE;",
        key, content
    ));
    builder.finish()
}

/// Count the matches, then assign `assignments` to each of them
///
/// The count is statement 0 of the response.
pub fn update<'a>(
    table: &str,
    assignments: impl IntoIterator<Item = (&'a str, &'a Value)>,
    conditions: &[FilterCondition],
) -> RepositoryResult<SurrealQuery> {
    let mut builder = QueryBuilder::new(table);
    builder.push_count(conditions)?;
    builder.push(" UPDATE type::table($table) SET ");
    for (i, (name, value)) in assignments.into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        let target = field(name)?;
        let placeholder = builder.bind(value.clone());
        builder.push(&format!("{} = {}", target, placeholder));
    }
    builder.push_where(conditions)?;
    builder.push(" RETURN NONE;");
    Ok(builder.finish())
}

/// Count the matches, then replace their content with `document`
pub fn replace(
    table: &str,
    document: Map<String, Value>,
    conditions: &[FilterCondition],
) -> RepositoryResult<SurrealQuery> {
    let mut builder = QueryBuilder::new(table);
    builder.push_count(conditions)?;
    let content = builder.bind(Value::Object(document));
    builder.push(&format!(" UPDATE type::table($table) CONTENT {}", content));
    builder.push_where(conditions)?;
    builder.push(" RETURN NONE;");
    Ok(builder.finish())
}

/// Count the matches, then delete them
pub fn delete(table: &str, conditions: &[FilterCondition]) -> RepositoryResult<SurrealQuery> {
    let mut builder = QueryBuilder::new(table);
    builder.push_count(conditions)?;
    builder.push(" DELETE FROM type::table($table)");
    builder.push_where(conditions)?;
    builder.push(" RETURN NONE;");
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Predicate;
    use crate::test_support::{Note, NoteField};
    use serde_json::json;

    #[test]
    fn test_select_renders_bindings() {
        let predicate = Predicate::<Note>::new()
            .gte(NoteField::Stars, 3)
            .contains(NoteField::Title, "rust")
            .order_by(NoteField::Stars, OrderDirection::Descending);
        let query = select(
            "Notes",
            predicate.conditions(),
            predicate.ordering(),
            Some(Window {
                offset: 4,
                limit: 2,
            }),
        )
        .unwrap();

        assert_eq!(
            query.text,
            "SELECT * OMIT id FROM type::table($table) WHERE `stars` >= $p0 AND `title` CONTAINS $p1 ORDER BY `stars` DESC LIMIT 2 START 4;"
        );
        assert_eq!(query.bindings["table"], json!("Notes"));
        assert_eq!(query.bindings["p0"], json!(3));
        assert_eq!(query.bindings["p1"], json!("rust"));
    }

    #[test]
    fn test_null_checks_cover_missing_fields() {
        let predicate = Predicate::<Note>::new().is_null(NoteField::Title);
        let query = count("Notes", predicate.conditions()).unwrap();
        assert_eq!(
            query.text,
            "SELECT count() AS total FROM type::table($table) WHERE (`title` = NONE OR `title` = NULL) GROUP ALL;"
        );
    }

    #[test]
    fn test_update_counts_then_sets() {
        let stars = json!(5);
        let predicate = Predicate::<Note>::field_eq(NoteField::Id, "n-1");
        let query = update("Notes", [("stars", &stars)], predicate.conditions()).unwrap();
        assert_eq!(
            query.text,
            "SELECT count() AS total FROM type::table($table) WHERE `_id` = $p0 GROUP ALL; UPDATE type::table($table) SET `stars` = $p1 WHERE `_id` = $p2 RETURN NONE;"
        );
        assert_eq!(query.bindings["p1"], json!(5));
    }

    #[test]
    fn test_in_binds_a_list() {
        let predicate =
            Predicate::<Note>::new().is_in(NoteField::Id, vec!["a".to_string(), "b".to_string()]);
        let query = delete("Notes", predicate.conditions()).unwrap();
        assert!(query.text.contains("DELETE FROM type::table($table) WHERE `_id` IN $p1"));
        assert_eq!(query.bindings["p1"], json!(["a", "b"]));
    }

    #[test]
    fn test_field_names_are_validated() {
        assert_eq!(field("_id").unwrap(), "`_id`");
        assert!(field("a`b").is_err());
    }
}
