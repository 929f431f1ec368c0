use crate::app::ports::GraphStorePort;
use crate::config::GraphConfig;
use crate::constants::{RDF_TYPE, XSD_INTEGER};
use crate::error::{LoaderError, Result};
use crate::rdf::{Term, Triple};
use crate::types::{Record, RecordSet, ScalarType, Value};
use metrics::counter;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// How the records of one set become statements.
#[derive(Debug, Clone)]
pub struct GraphMapping {
    pub base_uri: String,
    pub vocab_uri: String,
    pub subject_column: String,
    pub type_column: Option<String>,
    pub classes: BTreeMap<String, String>,
    pub predicates: BTreeMap<String, String>,
    pub relations: BTreeMap<String, String>,
}

impl GraphMapping {
    pub fn new(base_uri: &str, vocab_uri: Option<&str>, id_column: &str, config: &GraphConfig) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            vocab_uri: vocab_uri.unwrap_or(base_uri).to_string(),
            subject_column: config
                .subject_column
                .clone()
                .unwrap_or_else(|| id_column.to_string()),
            type_column: config.type_column.clone(),
            classes: config.classes.clone(),
            predicates: config.predicates.clone(),
            relations: config.relations.clone(),
        }
    }

    pub fn subject_iri(&self, local: &str) -> String {
        format!("{}{}", self.base_uri, local)
    }

    pub fn class_iri(&self, value: &str) -> String {
        self.classes
            .get(value)
            .cloned()
            .unwrap_or_else(|| format!("{}{}", self.vocab_uri, value))
    }

    /// Predicate for a literal or relation column
    pub fn predicate_for(&self, column: &str) -> String {
        if let Some(p) = self.relations.get(column).or_else(|| self.predicates.get(column)) {
            return p.clone();
        }
        format!("{}{}", self.vocab_uri, column.replace(' ', "_"))
    }

    /// Every column of `set` must map to its own predicate, or read-back could
    /// not tell the values apart.
    pub fn check_columns(&self, set: &RecordSet) -> Result<()> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        if let Some(type_column) = &self.type_column {
            seen.insert(RDF_TYPE.to_string(), type_column.as_str());
        }
        for column in &set.columns {
            if self.type_column.as_deref() == Some(column.name.as_str()) {
                continue;
            }
            let predicate = self.predicate_for(&column.name);
            if let Some(other) = seen.insert(predicate.clone(), column.name.as_str()) {
                return Err(LoaderError::schema(
                    &set.name,
                    format!(
                        "columns '{}' and '{}' both map to predicate <{}>",
                        other, column.name, predicate
                    ),
                ));
            }
        }
        Ok(())
    }

    fn subject_of(&self, set: &str, index: usize, record: &Record) -> Result<String> {
        match record.get(&self.subject_column) {
            Some(v) => Ok(self.subject_iri(&v.key_string())),
            None => Err(LoaderError::schema(
                set,
                format!("record {} has no subject column '{}'", index, self.subject_column),
            )),
        }
    }

    /// One statement per present attribute; absent attributes produce nothing.
    pub fn record_to_triples(&self, set: &str, index: usize, record: &Record) -> Result<Vec<Triple>> {
        let subject = self.subject_of(set, index, record)?;
        let mut triples = Vec::with_capacity(record.len());
        for (column, value) in record.iter() {
            let object = if self.type_column.as_deref() == Some(column.as_str()) {
                triples.push(Triple::new(
                    &subject,
                    RDF_TYPE,
                    Term::iri(self.class_iri(&value.key_string())),
                ));
                continue;
            } else if self.relations.contains_key(column) {
                Term::iri(self.subject_iri(&value.key_string()))
            } else {
                match value {
                    Value::Integer(i) => Term::integer(*i),
                    Value::Text(s) => Term::plain(s.clone()),
                }
            };
            triples.push(Triple::new(&subject, self.predicate_for(column), object));
        }
        Ok(triples)
    }

    /// Inverse of `record_to_triples` over the columns of `set`.
    pub fn triples_to_record(&self, set: &RecordSet, triples: &[Triple]) -> Record {
        let mut by_predicate: BTreeMap<String, &str> = BTreeMap::new();
        for column in &set.columns {
            if self.type_column.as_deref() == Some(column.name.as_str()) {
                continue;
            }
            by_predicate.insert(self.predicate_for(&column.name), &column.name);
        }

        let mut record = Record::new();
        for triple in triples {
            if triple.predicate == RDF_TYPE {
                if let (Some(type_column), Term::Iri(class)) = (&self.type_column, &triple.object) {
                    record.set(type_column.clone(), Value::Text(self.class_value(class)));
                }
                continue;
            }
            let column = match by_predicate.get(&triple.predicate) {
                Some(c) => *c,
                None => continue,
            };
            let value = match &triple.object {
                Term::Iri(iri) if self.relations.contains_key(column) => Value::Text(
                    iri.strip_prefix(&self.base_uri).unwrap_or(iri).to_string(),
                ),
                Term::Iri(iri) => Value::Text(iri.clone()),
                Term::Literal { value, datatype } => {
                    let integer_column = set.column(column).map(|c| c.ty) == Some(ScalarType::Integer);
                    if datatype.as_deref() == Some(XSD_INTEGER) || integer_column {
                        match value.parse::<i64>() {
                            Ok(i) => Value::Integer(i),
                            Err(_) => Value::Text(value.clone()),
                        }
                    } else {
                        Value::Text(value.clone())
                    }
                }
            };
            record.set(column, value);
        }
        record
    }

    fn class_value(&self, class: &str) -> String {
        if let Some((value, _)) = self.classes.iter().find(|(_, iri)| iri.as_str() == class) {
            return value.clone();
        }
        class.strip_prefix(&self.vocab_uri).unwrap_or(class).to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphAck {
    pub subjects: usize,
    pub statements: usize,
    pub requests: usize,
}

/// Write every record of `set` to `store`, `batch_size` statements per request.
#[instrument(skip(set, mapping, store), fields(set = %set.name, records = set.len()))]
pub async fn persist_graph(
    set: &RecordSet,
    mapping: &GraphMapping,
    store: &dyn GraphStorePort,
    batch_size: usize,
) -> Result<GraphAck> {
    mapping.check_columns(set)?;
    let mut triples = Vec::new();
    for (index, record) in set.records.iter().enumerate() {
        triples.extend(mapping.record_to_triples(&set.name, index, record)?);
    }

    let mut ack = GraphAck {
        subjects: set.len(),
        ..Default::default()
    };
    for chunk in triples.chunks(batch_size.max(1)) {
        store.insert(chunk).await?;
        ack.statements += chunk.len();
        ack.requests += 1;
        debug!("Sent {}/{} statements", ack.statements, triples.len());
    }

    counter!("tabload_statements_persisted_total", "set" => set.name.clone())
        .increment(ack.statements as u64);
    info!(
        "Wrote {} statements for {} subjects in {} requests",
        ack.statements, ack.subjects, ack.requests
    );
    Ok(ack)
}

/// Read back every record of `set` by describing its subjects.
pub async fn read_back_graph(
    set: &RecordSet,
    mapping: &GraphMapping,
    store: &dyn GraphStorePort,
) -> Result<Vec<Record>> {
    mapping.check_columns(set)?;
    let mut records = Vec::with_capacity(set.len());
    for (index, record) in set.records.iter().enumerate() {
        let subject = mapping.subject_of(&set.name, index, record)?;
        let triples = store.describe(&subject).await?;
        records.push(mapping.triples_to_record(set, &triples));
    }
    Ok(records)
}
