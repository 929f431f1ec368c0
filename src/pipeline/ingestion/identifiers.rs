use crate::error::{LoaderError, Result};
use crate::types::{Column, RecordSet, ScalarType, Value};

/// `<prefix>-<index>`
pub fn synthetic_id(prefix: &str, index: usize) -> String {
    format!("{}-{}", prefix, index)
}

/// Give the i-th record `prefix-i` in `column`.
///
/// Depends only on record position, so re-running over the same input order
/// yields the same identifiers. A set that already has `column` is rejected
/// rather than overwritten.
pub fn assign_identifiers(mut set: RecordSet, prefix: &str, column: &str) -> Result<RecordSet> {
    if set.has_column(column) {
        return Err(LoaderError::schema(
            &set.name,
            format!("identifier column '{}' already exists in the input", column),
        ));
    }
    set.columns.push(Column::new(column, ScalarType::String));
    for (index, record) in set.records.iter_mut().enumerate() {
        record.set(column, Value::Text(synthetic_id(prefix, index)));
    }
    Ok(set)
}
