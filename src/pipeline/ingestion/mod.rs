// Pipeline ingestion: reading delimited sources and stamping synthetic identifiers

pub mod csv_source;
pub mod identifiers;

pub use csv_source::CsvSource;
pub use identifiers::{assign_identifiers, synthetic_id};
