/// Column that receives the synthetic `<prefix>-<index>` identifier
pub const DEFAULT_ID_COLUMN: &str = "internal_id";

/// Statements per `INSERT DATA` request
pub const DEFAULT_BATCH_SIZE: usize = 500;

pub const DEFAULT_DELIMITER: char = ',';

// Reserved vocabulary
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

// Environment overrides (read after `.env` is loaded)
pub const ENV_SPARQL_ENDPOINT: &str = "TABLOAD_SPARQL_ENDPOINT";
pub const ENV_BASE_URI: &str = "TABLOAD_BASE_URI";
pub const ENV_SQLITE_PATH: &str = "TABLOAD_SQLITE_PATH";

pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
