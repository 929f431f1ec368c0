pub mod memory_graph;
pub mod sparql_http;
pub mod sqlite_store;
