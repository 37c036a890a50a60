//! Row decoding into JSON records

use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::{Column, Row};

use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

/// Decode every column of `row` into a record keyed by column name
///
/// Columns are tried as integer, float, text, boolean and blob in that order;
/// the first type the driver accepts wins and `NULL` becomes `Value::Null`.
pub fn to_record(row: &AnyRow) -> RepositoryResult<Map<String, Value>> {
    let mut record = Map::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), decode_column(row, index)?);
    }
    Ok(record)
}

fn decode_column(row: &AnyRow, index: usize) -> RepositoryResult<Value> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::from));
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::from));
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::String));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return Ok(value.map_or(Value::Null, Value::Bool));
    }
    match row.try_get::<Option<Vec<u8>>, _>(index) {
        Ok(value) => Ok(value.map_or(Value::Null, Value::from)),
        Err(e) => Err(RepositoryError::serialization_error(
            RepositoryOperation::FindAll,
            format!(
                "Column '{}' has a type with no record representation",
                row.columns()
                    .get(index)
                    .map(|c| c.name().to_string())
                    .unwrap_or_default()
            ),
        )
        .with_source(e)),
    }
}

/// Read the `total` column of a `COUNT(*)` row
pub fn count_of(row: &AnyRow) -> RepositoryResult<u64> {
    let total: i64 = row.try_get("total").map_err(|e| {
        RepositoryError::serialization_error(RepositoryOperation::Count, e.to_string())
            .with_source(e)
    })?;
    Ok(u64::try_from(total).unwrap_or(0))
}
