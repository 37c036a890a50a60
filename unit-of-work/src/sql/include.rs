//! Eager loading of related rows
//!
//! An [`Include`] names a relation to attach to every fetched entity, plus an
//! optional second-level relation attached to each related row. Each level
//! is loaded with one `IN` query, never one query per parent.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::context::SqlContext;
use super::{row, statement};
use crate::repository::{FieldValue, FilterCondition, FilterOperator, RepositoryResult};

/// How many related rows each parent has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Attached as an object, or `null` when absent
    One,
    /// Attached as an array, empty when absent
    Many,
}

/// A foreign-key relation from a parent row to rows of `table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Key the related rows are attached under
    pub name: &'static str,
    /// Table holding the related rows
    pub table: &'static str,
    /// Parent column the relation is keyed on
    pub local_key: &'static str,
    /// Related column that references `local_key`
    pub foreign_key: &'static str,
    pub cardinality: Cardinality,
}

impl Relation {
    /// A one-to-many relation
    pub const fn many(
        name: &'static str,
        table: &'static str,
        local_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_key,
            foreign_key,
            cardinality: Cardinality::Many,
        }
    }

    /// A to-one relation
    pub const fn one(
        name: &'static str,
        table: &'static str,
        local_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            local_key,
            foreign_key,
            cardinality: Cardinality::One,
        }
    }
}

/// A relation to eager-load, optionally followed by one nested relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub relation: Relation,
    pub then: Option<Relation>,
}

impl Include {
    pub fn new(relation: Relation) -> Self {
        Self {
            relation,
            then: None,
        }
    }

    /// Also load `relation` for every row loaded by this include
    #[must_use]
    pub fn then_include(mut self, relation: Relation) -> Self {
        self.then = Some(relation);
        self
    }
}

impl From<Relation> for Include {
    fn from(relation: Relation) -> Self {
        Self::new(relation)
    }
}

/// Attach every include to `records` in place
///
/// Includes of the same relation are loaded once, with all of their nested
/// relations attached to the shared related rows.
pub(crate) async fn load_includes(
    context: &SqlContext,
    records: &mut [Map<String, Value>],
    includes: &[Include],
) -> RepositoryResult<()> {
    let mut loaded: Vec<&Relation> = Vec::new();
    for include in includes {
        if loaded.contains(&&include.relation) {
            continue;
        }
        loaded.push(&include.relation);

        let mut nested: Vec<&Relation> = Vec::new();
        for then in includes
            .iter()
            .filter(|other| other.relation == include.relation)
            .filter_map(|other| other.then.as_ref())
        {
            if !nested.contains(&then) {
                nested.push(then);
            }
        }

        let mut related = load_related(context, records, &include.relation).await?;
        for relation in nested {
            let grandchildren = load_related(context, &related, relation).await?;
            attach(&mut related, relation, grandchildren);
        }
        attach(records, &include.relation, related);
    }
    Ok(())
}

async fn load_related(
    context: &SqlContext,
    parents: &[Map<String, Value>],
    relation: &Relation,
) -> RepositoryResult<Vec<Map<String, Value>>> {
    let mut keys: Vec<Value> = Vec::new();
    for value in parents.iter().filter_map(|p| p.get(relation.local_key)) {
        if !value.is_null() && !keys.contains(value) {
            keys.push(value.clone());
        }
    }
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let condition = FilterCondition::new(relation.foreign_key, FilterOperator::In, key_list(keys));
    let stmt = statement::select(
        context.dialect(),
        relation.table,
        None,
        &[condition],
        None,
        None,
    )?;
    let rows = context.fetch_all(&stmt).await?;
    tracing::debug!(
        relation = relation.name,
        table = relation.table,
        rows = rows.len(),
        "Loaded related rows"
    );
    rows.iter().map(row::to_record).collect()
}

fn key_list(keys: Vec<Value>) -> FieldValue {
    if let Some(ints) = keys.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
        return FieldValue::IntegerList(ints);
    }
    FieldValue::StringList(
        keys.into_iter()
            .map(|k| match k {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    )
}

fn attach(parents: &mut [Map<String, Value>], relation: &Relation, children: Vec<Map<String, Value>>) {
    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for child in children {
        let key = child
            .get(relation.foreign_key)
            .map(join_key)
            .unwrap_or_default();
        grouped.entry(key).or_default().push(Value::Object(child));
    }

    for parent in parents.iter_mut() {
        let key = parent.get(relation.local_key).map(join_key);
        let mut matched = key
            .and_then(|k| grouped.get(&k).cloned())
            .unwrap_or_default();
        let value = match relation.cardinality {
            Cardinality::Many => Value::Array(matched),
            Cardinality::One if matched.is_empty() => Value::Null,
            Cardinality::One => matched.swap_remove(0),
        };
        parent.insert(relation.name.to_string(), value);
    }
}

/// Compare keys by their scalar text so `1` and `"1"` join
fn join_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_attach_many_and_one() {
        let orders = Relation::many("orders", "Order", "Id", "customer_id");
        let mut parents = vec![record(json!({"Id": "A"})), record(json!({"Id": "B"}))];
        let children = vec![
            record(json!({"Id": "o1", "customer_id": "A"})),
            record(json!({"Id": "o2", "customer_id": "A"})),
        ];
        attach(&mut parents, &orders, children.clone());
        assert_eq!(parents[0]["orders"].as_array().unwrap().len(), 2);
        assert_eq!(parents[1]["orders"], json!([]));

        let customer = Relation::one("customer", "Customer", "customer_id", "Id");
        let mut orders = children;
        attach(
            &mut orders,
            &customer,
            vec![record(json!({"Id": "A", "name": "Ada"}))],
        );
        assert_eq!(orders[0]["customer"]["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn test_includes_of_one_relation_merge_nested_loads() {
        let db = crate::test_support::sql::database().await;
        for sql in [
            r#"INSERT INTO "Customer" ("Id", "name", "age") VALUES ('A', 'Ada', 36)"#,
            r#"INSERT INTO "Order" ("Id", "customer_id", "total") VALUES ('o1', 'A', 10)"#,
            r#"INSERT INTO "order_lines" ("Id", "order_id", "sku") VALUES ('l1', 'o1', 'KB-1')"#,
        ] {
            db.execute_raw(sql).await.unwrap();
        }

        let orders = Relation::many("orders", "Order", "Id", "customer_id");
        let includes = [
            Include::new(orders.clone())
                .then_include(Relation::many("lines", "order_lines", "Id", "order_id")),
            Include::new(orders.clone())
                .then_include(Relation::one("customer", "Customer", "customer_id", "Id")),
            Include::new(orders),
        ];
        let mut records = vec![record(json!({"Id": "A"}))];
        load_includes(&db.context(), &mut records, &includes)
            .await
            .unwrap();

        let attached = records[0]["orders"].as_array().unwrap();
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0]["lines"][0]["sku"], json!("KB-1"));
        assert_eq!(attached[0]["customer"]["name"], json!("Ada"));
    }

    #[test]
    fn test_key_list_types() {
        assert_eq!(
            key_list(vec![json!(1), json!(2)]),
            FieldValue::IntegerList(vec![1, 2])
        );
        assert_eq!(
            key_list(vec![json!("a"), json!(2)]),
            FieldValue::StringList(vec!["a".to_string(), "2".to_string()])
        );
    }
}
