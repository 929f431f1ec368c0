use crate::app::ports::GraphStorePort;
use crate::config::{DestinationConfig, LoadPlan};
use crate::error::{LoaderError, PipelineError, Stage};
use crate::infra::sparql_http::SparqlHttpStore;
use crate::infra::sqlite_store::{ForeignKey, SqliteStore};
use crate::pipeline::persist::with_sqlite;
use crate::types::{Column, Record, ScalarType};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TableSummary {
    pub table: String,
    pub rows: u64,
    pub sample: Vec<Record>,
    /// (foreign key column, rows that do not resolve)
    pub dangling: Vec<(String, u64)>,
}

#[derive(Debug, Clone)]
pub enum VerifyReport {
    Relational(Vec<TableSummary>),
    Graph(Vec<(String, u64)>),
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyReport::Relational(tables) => {
                for t in tables {
                    writeln!(f, "📋 {} ({} rows)", t.table, t.rows)?;
                    for record in &t.sample {
                        let cells: Vec<String> =
                            record.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                        writeln!(f, "   {}", cells.join(", "))?;
                    }
                    for (column, n) in &t.dangling {
                        writeln!(f, "   ⚠️  {} rows with unresolved {}", n, column)?;
                    }
                }
                Ok(())
            }
            VerifyReport::Graph(classes) => {
                for (class, n) in classes {
                    writeln!(f, "🔎 {} subjects of type <{}>", n, class)?;
                }
                Ok(())
            }
        }
    }
}

/// Verification queries against the destination of a plan.
pub struct VerifyUseCase {
    plan: LoadPlan,
}

impl VerifyUseCase {
    pub fn new(plan: LoadPlan) -> Result<Self, LoaderError> {
        plan.validate()?;
        Ok(Self { plan })
    }

    pub async fn run(&self, limit: usize) -> Result<VerifyReport, PipelineError> {
        match &self.plan.destination {
            DestinationConfig::Sqlite {
                path, table_prefix, ..
            } => with_sqlite(path, |store| self.verify_tables(store, table_prefix, limit))
                .map(VerifyReport::Relational)
                .map_err(|e| e.at(Stage::Verify)),
            DestinationConfig::Sparql {
                endpoint,
                query_endpoint,
                timeout_secs,
                ..
            } => {
                let store = SparqlHttpStore::new(
                    endpoint,
                    query_endpoint.as_deref(),
                    Duration::from_secs(*timeout_secs),
                )
                .map_err(|e| e.at(Stage::Verify))?;
                self.run_with_graph_store(&store).await
            }
        }
    }

    pub async fn run_with_graph_store(&self, store: &dyn GraphStorePort) -> Result<VerifyReport, PipelineError> {
        let counts = store.class_counts().await.map_err(|e| e.at(Stage::Verify))?;
        info!("Graph holds {} classes", counts.len());
        Ok(VerifyReport::Graph(counts))
    }

    fn verify_tables(&self, store: &SqliteStore, table_prefix: &str, limit: usize) -> Result<Vec<TableSummary>, LoaderError> {
        let mut summaries = Vec::new();
        for source in self.plan.sources.iter().filter(|s| s.persist) {
            let table = format!("{}{}", table_prefix, source.table_name());
            let columns = match store.table_columns(&table)? {
                Some(names) => names,
                None => {
                    warn!("Table {} does not exist", table);
                    continue;
                }
            };
            let typed: Vec<Column> = columns
                .iter()
                .map(|name| {
                    let ty = source
                        .columns
                        .iter()
                        .find(|c| &c.name == name)
                        .map(|c| c.ty)
                        .unwrap_or(ScalarType::String);
                    Column::new(name.clone(), ty)
                })
                .collect();

            let rows = store.row_count(&table)?;
            let mut sample = store.read_table(&table, &typed)?;
            sample.truncate(limit);

            let mut dangling = Vec::new();
            for fk in &source.foreign_keys {
                if let Some(target) = self.plan.source(&fk.references) {
                    let fk = ForeignKey {
                        column: fk.column.clone(),
                        table: format!("{}{}", table_prefix, target.table_name()),
                        key: target.key.clone(),
                    };
                    let n = store.dangling_references(&table, &fk)?;
                    if n > 0 {
                        dangling.push((fk.column, n));
                    }
                }
            }

            summaries.push(TableSummary {
                table,
                rows,
                sample,
                dangling,
            });
        }
        Ok(summaries)
    }
}
