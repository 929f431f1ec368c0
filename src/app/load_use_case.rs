use crate::app::ports::GraphStorePort;
use crate::config::{DestinationConfig, LoadPlan, SourceConfig};
use crate::error::{LoaderError, PipelineError, Stage};
use crate::infra::sparql_http::SparqlHttpStore;
use crate::infra::sqlite_store::ForeignKey;
use crate::pipeline::ingestion::{assign_identifiers, CsvSource};
use crate::pipeline::persist::{self, GraphMapping};
use crate::pipeline::processing::join_carrying;
use crate::types::RecordSet;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use uuid::Uuid;

type StageResult<T> = std::result::Result<T, PipelineError>;

/// Outcome of one set in a run
#[derive(Debug, Clone, Serialize)]
pub struct SetReport {
    pub name: String,
    pub loaded: usize,
    /// Table name or base URI the set was written to
    pub target: String,
    pub rows: usize,
    pub statements: usize,
}

/// Result of a complete load run
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sets: Vec<SetReport>,
}

/// Runs a `LoadPlan`: load, identify, join, persist.
pub struct LoadUseCase {
    plan: LoadPlan,
}

impl LoadUseCase {
    pub fn new(plan: LoadPlan) -> Result<Self, LoaderError> {
        plan.validate()?;
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &LoadPlan {
        &self.plan
    }

    fn record_stage(stage: Stage, started: Instant) {
        histogram!("tabload_stage_duration_seconds", "stage" => stage.to_string())
            .record(started.elapsed().as_secs_f64());
    }

    /// Load, identify and join every source; sets come back in plan order.
    #[instrument(skip(self))]
    pub fn prepare(&self) -> StageResult<Vec<RecordSet>> {
        let started = Instant::now();
        let mut loaded = Vec::with_capacity(self.plan.sources.len());
        for source in &self.plan.sources {
            let set = CsvSource::new(&source.name, &source.path, source.columns.clone())
                .with_delimiter(source.delimiter as u8)
                .load()
                .map_err(|e| e.at(Stage::Load))?;
            counter!("tabload_records_loaded_total", "source" => source.name.clone())
                .increment(set.len() as u64);
            info!("📥 Loaded {} records from {}", set.len(), source.path.display());
            loaded.push(set);
        }
        Self::record_stage(Stage::Load, started);

        let started = Instant::now();
        let mut sets: Vec<RecordSet> = loaded
            .into_iter()
            .zip(&self.plan.sources)
            .map(|(set, source)| assign_identifiers(set, &source.id_prefix, &self.plan.id_column))
            .collect::<Result<_, LoaderError>>()
            .map_err(|e| e.at(Stage::Identify))?;
        Self::record_stage(Stage::Identify, started);

        let started = Instant::now();
        for join in &self.plan.joins {
            let left_idx = self.index_of(&join.left).map_err(|e| e.at(Stage::Join))?;
            let right_idx = self.index_of(&join.right).map_err(|e| e.at(Stage::Join))?;
            let right = sets[right_idx].clone();
            let left = std::mem::replace(&mut sets[left_idx], RecordSet::new(join.left.clone(), Vec::new()));
            sets[left_idx] = join_carrying(
                left,
                &right,
                &join.left_key,
                &join.right_key,
                join.mode,
                join.carry.as_deref(),
            )
            .map_err(|e| e.at(Stage::Join))?;
            info!("🔗 Joined {} with {} on {} = {}", join.left, join.right, join.left_key, join.right_key);
        }
        Self::record_stage(Stage::Join, started);

        Ok(sets)
    }

    fn index_of(&self, name: &str) -> Result<usize, LoaderError> {
        self.plan
            .sources
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| LoaderError::Config(format!("unknown source '{}'", name)))
    }

    /// Run against the destination named in the plan.
    pub async fn run(&self) -> StageResult<LoadReport> {
        match &self.plan.destination {
            DestinationConfig::Sqlite { .. } => self.execute(None).await,
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
                .map_err(|e| e.at(Stage::Persist))?;
                let store: &dyn GraphStorePort = &store;
                self.execute(Some(store)).await
            }
        }
    }

    /// Run a SPARQL plan against a caller-provided graph store.
    pub async fn run_with_graph_store(&self, store: &dyn GraphStorePort) -> StageResult<LoadReport> {
        self.execute(Some(store)).await
    }

    #[instrument(skip(self, graph_store))]
    async fn execute(&self, graph_store: Option<&dyn GraphStorePort>) -> StageResult<LoadReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "🚀 Starting load run");

        let sets = self.prepare()?;

        let started = Instant::now();
        let reports = match &self.plan.destination {
            DestinationConfig::Sqlite {
                path,
                mode,
                table_prefix,
            } => persist::with_sqlite(path, |store| {
                let mut reports = Vec::new();
                for (source, set) in self.persisted(&sets) {
                    let table = format!("{}{}", table_prefix, source.table_name());
                    let fks = self.foreign_keys(source, table_prefix);
                    let spec = persist::table_spec(set, &table, &source.key, fks)?;
                    let ack = persist::persist_relational(store, set, &spec, *mode)?;
                    reports.push(SetReport {
                        name: set.name.clone(),
                        loaded: set.len(),
                        target: table,
                        rows: ack.rows,
                        statements: 0,
                    });
                }
                Ok(reports)
            })
            .map_err(|e| e.at(Stage::Persist))?,
            DestinationConfig::Sparql {
                base_uri,
                vocab_uri,
                batch_size,
                ..
            } => {
                let store = graph_store.ok_or_else(|| {
                    LoaderError::DestinationUnavailable("no graph store configured".to_string())
                        .at(Stage::Persist)
                })?;
                let mut reports = Vec::new();
                for (source, set) in self.persisted(&sets) {
                    let mapping = GraphMapping::new(
                        base_uri,
                        vocab_uri.as_deref(),
                        &self.plan.id_column,
                        &source.graph,
                    );
                    let ack = persist::persist_graph(set, &mapping, store, *batch_size)
                        .await
                        .map_err(|e| e.at(Stage::Persist))?;
                    reports.push(SetReport {
                        name: set.name.clone(),
                        loaded: set.len(),
                        target: base_uri.clone(),
                        rows: ack.subjects,
                        statements: ack.statements,
                    });
                }
                reports
            }
        };
        Self::record_stage(Stage::Persist, started);

        let finished_at = Utc::now();
        info!(
            %run_id,
            "✅ Load run finished in {} ms",
            (finished_at - started_at).num_milliseconds()
        );
        Ok(LoadReport {
            run_id,
            started_at,
            finished_at,
            sets: reports,
        })
    }

    fn persisted<'a>(&'a self, sets: &'a [RecordSet]) -> impl Iterator<Item = (&'a SourceConfig, &'a RecordSet)> {
        self.plan
            .sources
            .iter()
            .zip(sets.iter())
            .filter(|(source, _)| source.persist)
    }

    fn foreign_keys(&self, source: &SourceConfig, table_prefix: &str) -> Vec<ForeignKey> {
        source
            .foreign_keys
            .iter()
            .filter_map(|fk| {
                self.plan.source(&fk.references).map(|target| ForeignKey {
                    column: fk.column.clone(),
                    table: format!("{}{}", table_prefix, target.table_name()),
                    key: target.key.clone(),
                })
            })
            .collect()
    }

    /// Graph mapping for `source` under the plan's destination, if it is a graph.
    pub fn graph_mapping(&self, source: &SourceConfig) -> Option<GraphMapping> {
        match &self.plan.destination {
            DestinationConfig::Sparql {
                base_uri, vocab_uri, ..
            } => Some(GraphMapping::new(
                base_uri,
                vocab_uri.as_deref(),
                &self.plan.id_column,
                &source.graph,
            )),
            DestinationConfig::Sqlite { .. } => None,
        }
    }
}
