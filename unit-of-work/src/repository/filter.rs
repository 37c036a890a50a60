//! Filtering and ordering types for repository queries
//!
//! A [`Predicate`] is a conjunction of [`FilterCondition`]s over the typed
//! fields of one entity, optionally ordered. Adapters render it into SQL or
//! SurrealQL with every value bound as a parameter.
//!
//! # Example
//!
//! ```rust,ignore
//! use unit_of_work::repository::{OrderDirection, Predicate};
//!
//! let adults = Predicate::<Customer>::new()
//!     .gte(CustomerField::Age, 18)
//!     .is_not_null(CustomerField::Email)
//!     .order_by(CustomerField::Name, OrderDirection::Ascending);
//!
//! assert_eq!(adults.to_string(), "age >= 18 AND email IS NOT NULL");
//! ```

use std::fmt;
use std::marker::PhantomData;

use serde_json::Value;

use crate::entity::{Entity, EntityField};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "ASC"),
            Self::Descending => write!(f, "DESC"),
        }
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Substring match
    Contains,
    /// Value is in a list (IN)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Contains => write!(f, "CONTAINS"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// A backend-neutral scalar used in filters, updates and identities
///
/// # Example
///
/// ```rust
/// use unit_of_work::repository::FieldValue;
///
/// let string_val: FieldValue = "active".into();
/// let int_val: FieldValue = 42_i64.into();
/// let bool_val: FieldValue = true.into();
/// assert_eq!(string_val.to_string(), "active");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// List of string values (for IN operator)
    StringList(Vec<String>),
    /// List of integer values (for IN operator)
    IntegerList(Vec<i64>),
    /// Null value
    Null,
}

impl FieldValue {
    /// Convert a JSON scalar (or a homogeneous list of scalars)
    ///
    /// Objects and mixed lists have no field-level equivalent and yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => {
                if let Some(strings) = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                {
                    Some(Self::StringList(strings))
                } else {
                    items
                        .iter()
                        .map(Value::as_i64)
                        .collect::<Option<Vec<_>>>()
                        .map(Self::IntegerList)
                }
            }
            Value::Object(_) => None,
        }
    }

    /// Convert to a JSON value for document stores and record comparison
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::StringList(list) => Value::from(list.clone()),
            Self::IntegerList(list) => Value::from(list.clone()),
            Self::Null => Value::Null,
        }
    }

    /// Whether this is a list value
    pub fn is_list(&self) -> bool {
        matches!(self, Self::StringList(_) | Self::IntegerList(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::StringList(list) => write!(f, "[{}]", list.join(", ")),
            Self::IntegerList(list) => {
                let items: Vec<String> = list.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(list: Vec<String>) -> Self {
        Self::StringList(list)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(list: Vec<i64>) -> Self {
        Self::IntegerList(list)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A single filter condition on a named field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: &'static str,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FieldValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: &'static str, operator: FilterOperator, value: FieldValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    /// Evaluate the condition against an in-memory record
    pub fn matches(&self, record: &serde_json::Map<String, Value>) -> bool {
        let actual = record.get(self.field).unwrap_or(&Value::Null);
        let expected = self.value.to_json();
        match self.operator {
            FilterOperator::Equal => json_eq(actual, &expected),
            FilterOperator::NotEqual => !json_eq(actual, &expected),
            FilterOperator::GreaterThan => json_cmp(actual, &expected).is_some_and(|o| o.is_gt()),
            FilterOperator::GreaterThanOrEqual => {
                json_cmp(actual, &expected).is_some_and(|o| o.is_ge())
            }
            FilterOperator::LessThan => json_cmp(actual, &expected).is_some_and(|o| o.is_lt()),
            FilterOperator::LessThanOrEqual => {
                json_cmp(actual, &expected).is_some_and(|o| o.is_le())
            }
            FilterOperator::Contains => match (actual, &expected) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle),
                _ => false,
            },
            FilterOperator::In => match &expected {
                Value::Array(options) => options.iter().any(|o| json_eq(actual, o)),
                _ => false,
            },
            FilterOperator::IsNull => actual.is_null(),
            FilterOperator::IsNotNull => !actual.is_null(),
        }
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            FilterOperator::IsNull | FilterOperator::IsNotNull => {
                write!(f, "{} {}", self.field, self.operator)
            }
            _ => write!(f, "{} {} {}", self.field, self.operator, self.value),
        }
    }
}

/// A typed conjunction of filter conditions over entity `T`
pub struct Predicate<T: Entity> {
    conditions: Vec<FilterCondition>,
    order_by: Option<(&'static str, OrderDirection)>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Predicate<T> {
    /// A predicate matching every entity
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            order_by: None,
            _entity: PhantomData,
        }
    }

    /// A single equality condition on a field chosen at runtime
    pub fn field_eq(field: T::Field, value: impl Into<FieldValue>) -> Self {
        Self::new().eq(field, value)
    }

    /// Add a condition with an explicit operator
    #[must_use]
    pub fn with(mut self, field: T::Field, operator: FilterOperator, value: FieldValue) -> Self {
        self.conditions
            .push(FilterCondition::new(field.name(), operator, value));
        self
    }

    /// field = value
    #[must_use]
    pub fn eq(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::Equal, value.into())
    }

    /// field != value
    #[must_use]
    pub fn ne(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::NotEqual, value.into())
    }

    /// field > value
    #[must_use]
    pub fn gt(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::GreaterThan, value.into())
    }

    /// field >= value
    #[must_use]
    pub fn gte(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// field < value
    #[must_use]
    pub fn lt(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::LessThan, value.into())
    }

    /// field <= value
    #[must_use]
    pub fn lte(self, field: T::Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// field contains the substring
    #[must_use]
    pub fn contains(self, field: T::Field, needle: impl Into<String>) -> Self {
        self.with(field, FilterOperator::Contains, FieldValue::String(needle.into()))
    }

    /// field is one of the listed values
    #[must_use]
    pub fn is_in(self, field: T::Field, values: impl Into<FieldValue>) -> Self {
        self.with(field, FilterOperator::In, values.into())
    }

    /// field IS NULL
    #[must_use]
    pub fn is_null(self, field: T::Field) -> Self {
        self.with(field, FilterOperator::IsNull, FieldValue::Null)
    }

    /// field IS NOT NULL
    #[must_use]
    pub fn is_not_null(self, field: T::Field) -> Self {
        self.with(field, FilterOperator::IsNotNull, FieldValue::Null)
    }

    /// Order results by a field
    #[must_use]
    pub fn order_by(mut self, field: T::Field, direction: OrderDirection) -> Self {
        self.order_by = Some((field.name(), direction));
        self
    }

    /// The conditions, all of which must hold
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// The requested ordering, if any
    pub fn ordering(&self) -> Option<(&'static str, OrderDirection)> {
        self.order_by
    }

    /// Whether the predicate has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against an in-memory record
    pub fn matches_record(&self, record: &serde_json::Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Evaluate against an entity by its serialized form
    pub fn matches(&self, entity: &T) -> bool {
        crate::entity::to_record(entity)
            .map(|record| self.matches_record(&record))
            .unwrap_or(false)
    }
}

impl<T: Entity> Default for Predicate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
            order_by: self.order_by,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("entity", &T::entity_name())
            .field("conditions", &self.conditions)
            .field("order_by", &self.order_by)
            .finish()
    }
}

impl<T: Entity> fmt::Display for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "true");
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{}", condition)?;
        }
        Ok(())
    }
}
