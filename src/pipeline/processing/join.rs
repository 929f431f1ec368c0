use crate::config::JoinMode;
use crate::error::{LoaderError, Result};
use crate::types::{Column, RecordSet};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Left-outer join of `left` against `right` on `left[left_key] == right[right_key]`.
///
/// Every left record appears exactly once. A right column whose name is
/// already used on the left is renamed `<right.name>_<column>`; the right key
/// itself is not copied. A left key matching several right records fails with
/// `AmbiguousJoin`.
pub fn join(
    left: RecordSet,
    right: &RecordSet,
    left_key: &str,
    right_key: &str,
    mode: JoinMode,
) -> Result<RecordSet> {
    join_carrying(left, right, left_key, right_key, mode, None)
}

/// Like `join`, but only the right columns named in `carry` are merged in.
#[instrument(skip(left, right, carry), fields(left = %left.name, right = %right.name))]
pub fn join_carrying(
    left: RecordSet,
    right: &RecordSet,
    left_key: &str,
    right_key: &str,
    mode: JoinMode,
    carry: Option<&[String]>,
) -> Result<RecordSet> {
    match mode {
        JoinMode::LeftOuter => left_outer(left, right, left_key, right_key, carry),
    }
}

fn left_outer(
    left: RecordSet,
    right: &RecordSet,
    left_key: &str,
    right_key: &str,
    carry: Option<&[String]>,
) -> Result<RecordSet> {
    if !left.has_column(left_key) {
        return Err(LoaderError::schema(
            &left.name,
            format!("join key '{}' is not a column", left_key),
        ));
    }
    if !right.has_column(right_key) {
        return Err(LoaderError::schema(
            &right.name,
            format!("join key '{}' is not a column", right_key),
        ));
    }

    if let Some(names) = carry {
        if let Some(missing) = names.iter().find(|n| !right.has_column(n)) {
            return Err(LoaderError::schema(
                &right.name,
                format!("carried column '{}' is not a column", missing),
            ));
        }
    }

    // (right column, output column)
    let mut carried: Vec<(String, String)> = Vec::new();
    let mut columns = left.columns.clone();
    let wanted = |name: &str| carry.map_or(true, |names| names.iter().any(|n| n == name));
    for column in right
        .columns
        .iter()
        .filter(|c| c.name != right_key && wanted(&c.name))
    {
        let mut out = column.name.clone();
        if columns.iter().any(|c| c.name == out) {
            out = format!("{}_{}", right.name, column.name);
        }
        if columns.iter().any(|c| c.name == out) {
            return Err(LoaderError::schema(
                &left.name,
                format!("joined column '{}' collides with an existing column", out),
            ));
        }
        columns.push(Column::new(out.clone(), column.ty));
        carried.push((column.name.clone(), out));
    }

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, record) in right.records.iter().enumerate() {
        if let Some(key) = record.get(right_key) {
            index.entry(key.key_string()).or_default().push(i);
        }
    }

    let mut matched = 0usize;
    let mut out = RecordSet::new(left.name, columns);
    out.records.reserve(left.records.len());
    for mut record in left.records {
        let hit = match record.get(left_key) {
            Some(key) => {
                let key = key.key_string();
                match index.get(&key).map(Vec::as_slice) {
                    Some([single]) => Some(*single),
                    Some(many) if many.len() > 1 => {
                        return Err(LoaderError::AmbiguousJoin {
                            key,
                            count: many.len(),
                            right: right.name.clone(),
                        });
                    }
                    _ => None,
                }
            }
            None => None,
        };

        if let Some(i) = hit {
            matched += 1;
            let source = &right.records[i];
            for (from, to) in &carried {
                if let Some(value) = source.get(from) {
                    record.set(to.clone(), value.clone());
                }
            }
        }
        out.records.push(record);
    }

    debug!(
        "Joined {} records, {} matched, {} without a match",
        out.len(),
        matched,
        out.len() - matched
    );
    Ok(out)
}
