//! Partial updates derived from arbitrary serializable objects
//!
//! Any `Serialize` value whose top level is a map or struct can describe an
//! update. Each top-level key becomes one assignment; nested values are
//! assigned whole and never merged into the stored value.
//!
//! ```rust,ignore
//! #[derive(Serialize)]
//! struct Rename<'a> {
//!     name: &'a str,
//! }
//!
//! let updates = FieldUpdates::<Customer>::from_object(&Rename { name: "Grace" })?;
//! assert_eq!(updates.len(), 1);
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation};
use super::traits::RepositoryResult;
use crate::entity::{Entity, EntityField};

/// Ordered field assignments for one update call
pub struct FieldUpdates<T: Entity> {
    assignments: Vec<(T::Field, Value)>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> FieldUpdates<T> {
    /// Derive assignments from the top-level fields of `updates`
    ///
    /// Keys that `T` does not declare fail with `InvalidField`. Assignments
    /// follow the field declaration order of `T`.
    pub fn from_object<U: Serialize + ?Sized>(updates: &U) -> RepositoryResult<Self> {
        let value = serde_json::to_value(updates).map_err(|e| {
            RepositoryError::serialization_error(RepositoryOperation::Update, e.to_string())
                .with_entity(T::entity_name())
                .with_source(e)
        })?;

        let Value::Object(object) = value else {
            return Err(RepositoryError::serialization_error(
                RepositoryOperation::Update,
                "Update object must serialize to a map of fields",
            )
            .with_entity(T::entity_name()));
        };

        let mut assignments = Vec::with_capacity(object.len());
        for (name, value) in object {
            let field = T::Field::from_name(&name)
                .ok_or_else(|| RepositoryError::invalid_field(T::entity_name(), &name))?;
            assignments.push((field, value));
        }
        // declaration order, whatever order the object serialized its keys in
        assignments.sort_by_key(|(field, _)| T::Field::all().iter().position(|f| f == field));

        Ok(Self {
            assignments,
            _entity: PhantomData,
        })
    }

    /// Assign a single field
    #[must_use]
    pub fn set(mut self, field: T::Field, value: impl Into<Value>) -> Self {
        self.assignments.push((field, value.into()));
        self
    }

    /// An update with no assignments
    pub fn empty() -> Self {
        Self {
            assignments: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Iterate over `(field, value)` assignments
    pub fn iter(&self) -> impl Iterator<Item = (T::Field, &Value)> {
        self.assignments.iter().map(|(field, value)| (*field, value))
    }

    /// Number of assignments
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Whether there is nothing to assign
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Whether any assignment targets the identity field
    pub fn touches_identity(&self) -> bool {
        self.assignments.iter().any(|(field, _)| *field == T::Field::ID)
    }

    /// Apply the assignments to an in-memory record
    pub fn apply_to(&self, record: &mut serde_json::Map<String, Value>) {
        for (field, value) in &self.assignments {
            record.insert(field.name().to_string(), value.clone());
        }
    }
}

impl<T: Entity> fmt::Debug for FieldUpdates<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.assignments.iter().map(|(k, v)| (k.name(), v)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::test_support::{Customer, CustomerField};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Rename {
        name: String,
        age: i64,
    }

    #[test]
    fn test_from_struct() {
        let updates = FieldUpdates::<Customer>::from_object(&Rename {
            name: "Grace".to_string(),
            age: 45,
        })
        .unwrap();
        let assignments: Vec<_> = updates.iter().collect();
        assert_eq!(
            assignments,
            vec![
                (CustomerField::Name, &json!("Grace")),
                (CustomerField::Age, &json!(45)),
            ]
        );
        assert!(!updates.touches_identity());
    }

    #[test]
    fn test_assignments_follow_declaration_order() {
        let mut map = BTreeMap::new();
        map.insert("email", json!(null));
        map.insert("age", json!(3));
        map.insert("Id", json!("c-3"));
        let updates = FieldUpdates::<Customer>::from_object(&map).unwrap();
        let fields: Vec<_> = updates.iter().map(|(field, _)| field).collect();
        assert_eq!(
            fields,
            vec![CustomerField::Id, CustomerField::Age, CustomerField::Email]
        );
    }

    #[test]
    fn test_from_map_and_json() {
        let mut map = BTreeMap::new();
        map.insert("email", json!("ada@example.com"));
        let updates = FieldUpdates::<Customer>::from_object(&map).unwrap();
        assert_eq!(updates.len(), 1);

        let updates = FieldUpdates::<Customer>::from_object(&json!({"Id": "c-9"})).unwrap();
        assert!(updates.touches_identity());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = FieldUpdates::<Customer>::from_object(&json!({"nickname": "A"})).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidField);
        assert_eq!(err.field.as_deref(), Some("nickname"));
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = FieldUpdates::<Customer>::from_object(&42).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::SerializationError);
    }

    #[test]
    fn test_nested_values_are_assigned_whole() {
        let updates =
            FieldUpdates::<Customer>::from_object(&json!({"email": {"primary": "x"}})).unwrap();
        let mut record = serde_json::Map::new();
        record.insert("email".to_string(), json!({"primary": "y", "backup": "z"}));
        updates.apply_to(&mut record);
        assert_eq!(record["email"], json!({"primary": "x"}));
    }

    #[test]
    fn test_set_builder() {
        let updates = FieldUpdates::<Customer>::empty().set(CustomerField::Age, 50);
        assert_eq!(updates.len(), 1);
        assert!(format!("{:?}", updates).contains("\"age\""));
    }
}
