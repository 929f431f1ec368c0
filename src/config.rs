use crate::constants;
use crate::error::{LoaderError, Result};
use crate::types::Column;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

static PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]*$").unwrap());
static SQL_IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A complete description of one run: sources, joins and destination.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadPlan {
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
    pub destination: DestinationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    pub id_prefix: String,
    /// Original identifier column; primary key in relational mode
    pub key: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub columns: Vec<Column>,
    pub table: Option<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyConfig>,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl SourceConfig {
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeyConfig {
    pub column: String,
    /// Name of the referenced source
    pub references: String,
}

/// Per-source RDF mapping
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphConfig {
    pub type_column: Option<String>,
    /// type column value -> class IRI
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
    /// column -> predicate IRI for literal-valued attributes
    #[serde(default)]
    pub predicates: BTreeMap<String, String>,
    /// column -> predicate IRI; the value names another record's subject
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
    /// Column whose value is appended to the base URI; defaults to the id column
    pub subject_column: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum JoinMode {
    #[default]
    #[serde(rename = "left-outer")]
    LeftOuter,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinConfig {
    pub left: String,
    pub right: String,
    pub left_key: String,
    pub right_key: String,
    #[serde(default)]
    pub mode: JoinMode,
    /// Right columns to merge in; all of them when omitted
    pub carry: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Replace,
    Append,
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "replace" => Ok(WriteMode::Replace),
            "append" => Ok(WriteMode::Append),
            other => Err(format!("unknown write mode '{}', expected replace or append", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    Sqlite {
        path: PathBuf,
        #[serde(default)]
        mode: WriteMode,
        #[serde(default)]
        table_prefix: String,
    },
    Sparql {
        endpoint: String,
        /// Defaults to `endpoint`
        query_endpoint: Option<String>,
        base_uri: String,
        /// Namespace for unmapped predicates and classes; defaults to `base_uri`
        vocab_uri: Option<String>,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

/// Command line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub sqlite: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub base_uri: Option<String>,
    pub mode: Option<WriteMode>,
    pub table_prefix: Option<String>,
}

fn default_id_column() -> String {
    constants::DEFAULT_ID_COLUMN.to_string()
}

fn default_delimiter() -> char {
    constants::DEFAULT_DELIMITER
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    constants::DEFAULT_BATCH_SIZE
}

fn default_timeout_secs() -> u64 {
    30
}

impl LoadPlan {
    /// Read a plan from TOML. Relative paths inside it resolve against the plan's directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read load plan '{}': {}", path.display(), e))
        })?;
        let mut plan: LoadPlan = toml::from_str(&content)?;
        if let Some(dir) = path.parent() {
            plan.resolve_paths(dir);
        }
        Ok(plan)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn resolve_paths(&mut self, dir: &Path) {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = dir.join(&source.path);
            }
        }
        if let DestinationConfig::Sqlite { path, .. } = &mut self.destination {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Environment overrides. Only variables matching the destination kind apply,
    /// except that a SPARQL endpoint in the environment never switches kinds on its own.
    pub fn apply_env(&mut self) {
        match &mut self.destination {
            DestinationConfig::Sqlite { path, .. } => {
                if let Ok(p) = std::env::var(constants::ENV_SQLITE_PATH) {
                    if !p.trim().is_empty() {
                        *path = PathBuf::from(p);
                    }
                }
            }
            DestinationConfig::Sparql {
                endpoint, base_uri, ..
            } => {
                if let Ok(e) = std::env::var(constants::ENV_SPARQL_ENDPOINT) {
                    if !e.trim().is_empty() {
                        *endpoint = e;
                    }
                }
                if let Ok(b) = std::env::var(constants::ENV_BASE_URI) {
                    if !b.trim().is_empty() {
                        *base_uri = b;
                    }
                }
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) -> Result<()> {
        if overrides.sqlite.is_some() && overrides.endpoint.is_some() {
            return Err(LoaderError::Config(
                "--sqlite and --endpoint are mutually exclusive".to_string(),
            ));
        }

        if let Some(path) = overrides.sqlite {
            let (mode, table_prefix) = match &self.destination {
                DestinationConfig::Sqlite {
                    mode, table_prefix, ..
                } => (*mode, table_prefix.clone()),
                DestinationConfig::Sparql { .. } => (WriteMode::default(), String::new()),
            };
            self.destination = DestinationConfig::Sqlite {
                path,
                mode,
                table_prefix,
            };
        }

        if let Some(url) = overrides.endpoint {
            match &mut self.destination {
                DestinationConfig::Sparql { endpoint, .. } => *endpoint = url,
                DestinationConfig::Sqlite { .. } => {
                    let base_uri = overrides.base_uri.clone().ok_or_else(|| {
                        LoaderError::Config(
                            "--endpoint on a sqlite plan also needs --base-uri".to_string(),
                        )
                    })?;
                    self.destination = DestinationConfig::Sparql {
                        endpoint: url,
                        query_endpoint: None,
                        base_uri,
                        vocab_uri: None,
                        batch_size: default_batch_size(),
                        timeout_secs: default_timeout_secs(),
                    };
                }
            }
        }

        match &mut self.destination {
            DestinationConfig::Sqlite {
                mode, table_prefix, ..
            } => {
                if let Some(m) = overrides.mode {
                    *mode = m;
                }
                if let Some(p) = overrides.table_prefix {
                    *table_prefix = p;
                }
            }
            DestinationConfig::Sparql { base_uri, .. } => {
                if let Some(b) = overrides.base_uri {
                    *base_uri = b;
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(LoaderError::Config("plan declares no sources".to_string()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(LoaderError::Config(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if !PREFIX_RE.is_match(&source.id_prefix) {
                return Err(LoaderError::Config(format!(
                    "source '{}': id prefix '{}' must match {}",
                    source.name,
                    source.id_prefix,
                    PREFIX_RE.as_str()
                )));
            }
            if !source.delimiter.is_ascii() {
                return Err(LoaderError::Config(format!(
                    "source '{}': delimiter must be a single ASCII character",
                    source.name
                )));
            }
        }

        for source in &self.sources {
            for fk in &source.foreign_keys {
                if self.source(&fk.references).is_none() {
                    return Err(LoaderError::Config(format!(
                        "source '{}': foreign key '{}' references unknown source '{}'",
                        source.name, fk.column, fk.references
                    )));
                }
            }
        }

        for join in &self.joins {
            for side in [&join.left, &join.right] {
                if self.source(side).is_none() {
                    return Err(LoaderError::Config(format!(
                        "join references unknown source '{}'",
                        side
                    )));
                }
            }
            if join.left == join.right {
                return Err(LoaderError::Config(format!(
                    "source '{}' cannot be joined with itself",
                    join.left
                )));
            }
        }

        match &self.destination {
            DestinationConfig::Sqlite { table_prefix, .. } => {
                for source in self.sources.iter().filter(|s| s.persist) {
                    let table = format!("{}{}", table_prefix, source.table_name());
                    if !SQL_IDENT_RE.is_match(&table) {
                        return Err(LoaderError::Config(format!(
                            "table name '{}' must match {}",
                            table,
                            SQL_IDENT_RE.as_str()
                        )));
                    }
                }
            }
            DestinationConfig::Sparql {
                base_uri,
                batch_size,
                ..
            } => {
                if base_uri.trim().is_empty() {
                    return Err(LoaderError::Config("base_uri must not be empty".to_string()));
                }
                if *batch_size == 0 {
                    return Err(LoaderError::Config("batch_size must be at least 1".to_string()));
                }
            }
        }
        Ok(())
    }
}
