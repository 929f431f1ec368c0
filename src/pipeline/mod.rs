// Data processing pipeline: ingestion, processing, and persistence

pub mod ingestion;
pub mod persist;
pub mod processing;

// Re-export key types and functions from each stage
pub use ingestion::{assign_identifiers, CsvSource};
pub use processing::join;
