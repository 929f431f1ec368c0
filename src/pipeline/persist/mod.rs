// Pipeline persistence: relational tables and graph statements

pub mod graph;
pub mod relational;

pub use graph::{persist_graph, read_back_graph, GraphAck, GraphMapping};
pub use relational::{persist_relational, read_back_relational, table_spec, with_sqlite, RelationalAck};
