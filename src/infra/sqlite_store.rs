use crate::error::{LoaderError, Result};
use crate::types::{Column, Record, ScalarType, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;
use tracing::debug;

/// Foreign key clause: `FOREIGN KEY (column) REFERENCES table(key)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub table: String,
    pub key: String,
}

/// Shape of one destination table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSpec {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote_ident(&c.name), c.ty.sql_type());
                if c.name == self.primary_key {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();
        for fk in &self.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                quote_ident(&fk.column),
                quote_ident(&fk.table),
                quote_ident(&fk.key)
            ));
        }
        format!("CREATE TABLE {} (\n    {}\n)", quote_ident(&self.name), parts.join(",\n    "))
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Integer(i) => i.to_sql(),
            Value::Text(s) => s.to_sql(),
        }
    }
}

/// File-backed relational destination.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LoaderError::DestinationUnavailable(format!("{}: {}", path.display(), e))
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| {
            LoaderError::DestinationUnavailable(format!("{}: {}", path.display(), e))
        })?;
        debug!("Opened SQLite destination {}", path.display());
        Ok(Self { conn })
    }

    /// Close explicitly so a failing close surfaces instead of being swallowed by `Drop`.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| LoaderError::Sqlite(e))
    }

    /// Column names in declaration order; `None` when the table does not exist.
    pub fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if names.is_empty() {
            Ok(None)
        } else {
            Ok(Some(names))
        }
    }

    pub fn drop_table(&self, table: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))?;
        Ok(())
    }

    pub fn create_table(&self, spec: &TableSpec) -> Result<()> {
        let sql = spec.create_sql();
        debug!("{}", sql);
        self.conn.execute_batch(&sql)?;
        Ok(())
    }

    /// Insert naming only the columns the record actually has.
    pub fn insert(&self, table: &str, record: &Record) -> Result<()> {
        let (columns, values): (Vec<&String>, Vec<&Value>) = record.iter().unzip();
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
        } else {
            let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                names.join(", "),
                placeholders.join(", ")
            )
        };
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values))?;
        Ok(())
    }

    /// All rows in insertion order; NULL cells are left out of the record.
    pub fn read_table(&self, table: &str, columns: &[Column]) -> Result<Vec<Record>> {
        let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            names.join(", "),
            quote_ident(table)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => continue,
                    ValueRef::Integer(n) => match column.ty {
                        ScalarType::Integer => Value::Integer(n),
                        ScalarType::String => Value::Text(n.to_string()),
                    },
                    ValueRef::Real(f) => Value::Text(f.to_string()),
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                        Value::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                };
                record.set(column.name.clone(), value);
            }
            records.push(record);
        }
        Ok(records)
    }

    pub fn row_count(&self, table: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// User tables, sorted by name
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Count rows of `table` whose `column` does not resolve to `target(key)`.
    pub fn dangling_references(&self, table: &str, fk: &ForeignKey) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {t} WHERE {c} IS NOT NULL AND {c} NOT IN (SELECT {k} FROM {r})",
            t = quote_ident(table),
            c = quote_ident(&fk.column),
            k = quote_ident(&fk.key),
            r = quote_ident(&fk.table),
        );
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TableSpec {
        TableSpec {
            name: "Publication".into(),
            primary_key: "id".into(),
            columns: vec![
                Column::new("id", ScalarType::String),
                Column::new("publication year", ScalarType::Integer),
                Column::new("venue", ScalarType::String),
            ],
            foreign_keys: vec![ForeignKey {
                column: "venue".into(),
                table: "Venue".into(),
                key: "id".into(),
            }],
        }
    }

    #[test]
    fn create_sql_quotes_identifiers() {
        assert_eq!(
            spec().create_sql(),
            "CREATE TABLE \"Publication\" (\n    \"id\" TEXT PRIMARY KEY,\n    \"publication year\" INTEGER,\n    \"venue\" TEXT,\n    FOREIGN KEY (\"venue\") REFERENCES \"Venue\"(\"id\")\n)"
        );
    }

    #[test]
    fn absent_values_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("t.db")).unwrap();
        store.create_table(&spec()).unwrap();
        store
            .insert("Publication", &Record::new().with("id", "doi:1").with("publication year", 2020i64))
            .unwrap();

        let empty: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM Publication WHERE venue IS NOT NULL OR venue = ''",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(empty, 0);

        let back = store.read_table("Publication", &spec().columns).unwrap();
        assert_eq!(back, vec![Record::new().with("id", "doi:1").with("publication year", 2020i64)]);
        assert_eq!(store.table_columns("Publication").unwrap().unwrap().len(), 3);
        assert_eq!(store.table_columns("Missing").unwrap(), None);
        store.close().unwrap();
    }
}
