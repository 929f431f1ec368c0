use crate::config::WriteMode;
use crate::error::{LoaderError, Result};
use crate::infra::sqlite_store::{ForeignKey, SqliteStore, TableSpec};
use crate::types::{Record, RecordSet};
use metrics::counter;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationalAck {
    pub rows: usize,
}

/// Derive the table for `set`: its columns as-is, `primary_key` as key.
pub fn table_spec(set: &RecordSet, table: &str, primary_key: &str, foreign_keys: Vec<ForeignKey>) -> Result<TableSpec> {
    if !set.has_column(primary_key) {
        return Err(LoaderError::schema(
            &set.name,
            format!("primary key column '{}' is not a column", primary_key),
        ));
    }
    for fk in &foreign_keys {
        if !set.has_column(&fk.column) {
            return Err(LoaderError::schema(
                &set.name,
                format!("foreign key column '{}' is not a column", fk.column),
            ));
        }
    }
    Ok(TableSpec {
        name: table.to_string(),
        primary_key: primary_key.to_string(),
        columns: set.columns.clone(),
        foreign_keys,
    })
}

/// Open the destination, run `f`, then close it. On error the connection is dropped.
pub fn with_sqlite<T>(path: &Path, f: impl FnOnce(&SqliteStore) -> Result<T>) -> Result<T> {
    let store = SqliteStore::open(path)?;
    let out = f(&store)?;
    store.close()?;
    Ok(out)
}

/// Write `set` into `spec.name`.
///
/// `Replace` drops and recreates the table. `Append` creates it when missing,
/// and otherwise requires the existing column set to equal the incoming one.
/// Rows are inserted one statement at a time without an enclosing transaction.
/// Every record must carry the primary key; the table is left untouched otherwise.
#[instrument(skip(store, set, spec), fields(table = %spec.name, rows = set.len()))]
pub fn persist_relational(
    store: &SqliteStore,
    set: &RecordSet,
    spec: &TableSpec,
    mode: WriteMode,
) -> Result<RelationalAck> {
    if let Some(row) = set.records.iter().position(|r| !r.contains(&spec.primary_key)) {
        return Err(LoaderError::schema(
            &set.name,
            format!("row {} has no value for primary key '{}'", row, spec.primary_key),
        ));
    }

    match mode {
        WriteMode::Replace => {
            store.drop_table(&spec.name)?;
            store.create_table(spec)?;
        }
        WriteMode::Append => match store.table_columns(&spec.name)? {
            None => store.create_table(spec)?,
            Some(existing) => {
                let incoming = spec.column_names();
                let a: BTreeSet<&String> = existing.iter().collect();
                let b: BTreeSet<&String> = incoming.iter().collect();
                if a != b {
                    return Err(LoaderError::SchemaConflict {
                        table: spec.name.clone(),
                        existing,
                        incoming,
                    });
                }
            }
        },
    }

    for record in &set.records {
        store.insert(&spec.name, record)?;
    }

    counter!("tabload_rows_persisted_total", "table" => spec.name.clone()).increment(set.len() as u64);
    info!("Wrote {} rows into {}", set.len(), spec.name);
    Ok(RelationalAck { rows: set.len() })
}

pub fn read_back_relational(store: &SqliteStore, spec: &TableSpec) -> Result<Vec<Record>> {
    store.read_table(&spec.name, &spec.columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ScalarType};

    fn venues() -> RecordSet {
        let mut set = RecordSet::new(
            "venue",
            vec![
                Column::new("id", ScalarType::String),
                Column::new("name", ScalarType::String),
                Column::new("internal_id", ScalarType::String),
            ],
        );
        set.records.push(Record::new().with("id", "v1").with("name", "A").with("internal_id", "venue-0"));
        set.records.push(Record::new().with("id", "v2").with("internal_id", "venue-1"));
        set
    }

    #[test]
    fn replace_round_trips_and_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        let set = venues();
        let spec = table_spec(&set, "Venue", "id", vec![]).unwrap();

        for _ in 0..2 {
            let ack = with_sqlite(&path, |store| persist_relational(store, &set, &spec, WriteMode::Replace)).unwrap();
            assert_eq!(ack.rows, 2);
        }
        let back = with_sqlite(&path, |store| read_back_relational(store, &spec)).unwrap();
        assert_eq!(back, set.records);
    }

    #[test]
    fn append_requires_matching_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        let set = venues();
        let spec = table_spec(&set, "Venue", "id", vec![]).unwrap();
        with_sqlite(&path, |store| persist_relational(store, &set, &spec, WriteMode::Append)).unwrap();

        let mut narrower = set.clone();
        narrower.columns.pop();
        for r in narrower.records.iter_mut() {
            *r = Record::new().with("id", format!("x{}", r.get("id").unwrap()).as_str());
        }
        let narrow_spec = table_spec(&narrower, "Venue", "id", vec![]).unwrap();
        let err = with_sqlite(&path, |store| {
            persist_relational(store, &narrower, &narrow_spec, WriteMode::Append)
        })
        .unwrap_err();
        assert!(matches!(err, LoaderError::SchemaConflict { .. }));

        // same column set appends
        let mut more = set.clone();
        more.records = vec![Record::new().with("id", "v3").with("internal_id", "venue-2")];
        with_sqlite(&path, |store| persist_relational(store, &more, &spec, WriteMode::Append)).unwrap();
        let count = with_sqlite(&path, |store| store.row_count("Venue")).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn duplicate_primary_key_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = venues();
        set.records.push(Record::new().with("id", "v1"));
        let spec = table_spec(&set, "Venue", "id", vec![]).unwrap();
        let err = with_sqlite(&dir.path().join("db.sqlite"), |store| {
            persist_relational(store, &set, &spec, WriteMode::Replace)
        })
        .unwrap_err();
        assert!(matches!(err, LoaderError::Sqlite(_)));
    }

    #[test]
    fn record_without_key_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        let set = venues();
        let spec = table_spec(&set, "Venue", "id", vec![]).unwrap();
        with_sqlite(&path, |store| persist_relational(store, &set, &spec, WriteMode::Replace)).unwrap();

        let mut keyless = set.clone();
        keyless.records = vec![
            Record::new().with("name", "A").with("internal_id", "venue-0"),
            Record::new().with("name", "B").with("internal_id", "venue-1"),
        ];
        let err = with_sqlite(&path, |store| {
            persist_relational(store, &keyless, &spec, WriteMode::Replace)
        })
        .unwrap_err();
        match err {
            LoaderError::SchemaMismatch { set, detail } => {
                assert_eq!(set, "venue");
                assert!(detail.contains("row 0"), "{}", detail);
            }
            other => panic!("unexpected error {:?}", other),
        }

        // the earlier load survives: nothing was dropped or inserted
        let back = with_sqlite(&path, |store| read_back_relational(store, &spec)).unwrap();
        assert_eq!(back, set.records);
    }

    #[test]
    fn unknown_primary_key_is_schema_mismatch() {
        assert!(matches!(
            table_spec(&venues(), "Venue", "issn", vec![]),
            Err(LoaderError::SchemaMismatch { .. })
        ));
    }
}
