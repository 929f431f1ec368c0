use crate::error::{LoaderError, Result};
use crate::types::{Column, Record, RecordSet, ScalarType, Value};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Reads one delimited file with a header row into a `RecordSet`.
pub struct CsvSource {
    name: String,
    path: PathBuf,
    delimiter: u8,
    schema: Vec<Column>,
}

impl CsvSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, schema: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            delimiter: b',',
            schema,
        }
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(source = %self.name, path = %self.path.display()))]
    pub fn load(&self) -> Result<RecordSet> {
        let file = File::open(&self.path).map_err(|e| LoaderError::SourceNotFound {
            path: self.path.clone(),
            source: e,
        })?;
        let set = self.load_from_reader(file)?;
        debug!("Loaded {} records", set.len());
        Ok(set)
    }

    /// Parse from any reader; `load` is this plus file opening.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<RecordSet> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let columns = self.resolve_columns(&headers)?;

        let mut set = RecordSet::new(self.name.clone(), columns);
        for (row, result) in reader.records().enumerate() {
            let raw = result?;
            let record = self.parse_row(row, &set.columns, &raw)?;
            set.records.push(record);
        }
        Ok(set)
    }

    /// Header columns in file order, typed by the schema; every schema column must appear.
    fn resolve_columns(&self, headers: &StringRecord) -> Result<Vec<Column>> {
        for expected in &self.schema {
            if !headers.iter().any(|h| h == expected.name) {
                return Err(LoaderError::schema(
                    &self.name,
                    format!("required column '{}' is absent from the header", expected.name),
                ));
            }
        }

        let mut columns: Vec<Column> = Vec::with_capacity(headers.len());
        for header in headers.iter() {
            if columns.iter().any(|c| c.name == header) {
                return Err(LoaderError::schema(
                    &self.name,
                    format!("column '{}' appears twice in the header", header),
                ));
            }
            let ty = self
                .schema
                .iter()
                .find(|c| c.name == header)
                .map(|c| c.ty)
                .unwrap_or(ScalarType::String);
            columns.push(Column::new(header, ty));
        }
        Ok(columns)
    }

    fn parse_row(&self, row: usize, columns: &[Column], raw: &StringRecord) -> Result<Record> {
        let mut record = Record::new();
        for (idx, column) in columns.iter().enumerate() {
            let cell = raw.get(idx).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            let value = Value::parse(cell, column.ty).ok_or_else(|| {
                LoaderError::schema(
                    &self.name,
                    format!(
                        "row {}: column '{}' expects an integer, found '{}'",
                        row, column.name, cell
                    ),
                )
            })?;
            record.set(column.name.clone(), value);
        }
        Ok(record)
    }
}
