// Pipeline processing: reshaping record sets between ingestion and persistence

pub mod join;

pub use join::{join, join_carrying};
