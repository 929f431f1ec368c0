use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
}

impl ScalarType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ScalarType::String => "TEXT",
            ScalarType::Integer => "INTEGER",
        }
    }
}

/// A present cell value. Absent cells are simply missing from the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Text(String),
}

impl Value {
    /// Parse a raw (already trimmed, non-empty) cell against its declared type.
    pub fn parse(raw: &str, ty: ScalarType) -> Option<Value> {
        match ty {
            ScalarType::String => Some(Value::Text(raw.to_string())),
            ScalarType::Integer => raw.parse::<i64>().ok().map(Value::Integer),
        }
    }

    /// Textual rendering used for key comparison and IRI construction
    pub fn key_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default = "default_scalar")]
    pub ty: ScalarType,
}

fn default_scalar() -> ScalarType {
    ScalarType::String
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ScalarType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// One input row: column name -> present value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Builder used mostly by tests and fixtures
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value.into());
        self
    }
}

/// A named, ordered collection of records sharing one column schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSet {
    pub name: String,
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl RecordSet {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
