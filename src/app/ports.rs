use crate::error::Result;
use crate::rdf::Triple;
use async_trait::async_trait;

/// A graph store that accepts statements and answers the read-back queries
/// the loader needs.
#[async_trait]
pub trait GraphStorePort: Send + Sync {
    /// Insert statements in one request
    async fn insert(&self, triples: &[Triple]) -> Result<()>;

    /// All statements with `subject` as subject
    async fn describe(&self, subject: &str) -> Result<Vec<Triple>>;

    /// Number of distinct subjects per `rdf:type` class, sorted by class IRI
    async fn class_counts(&self) -> Result<Vec<(String, u64)>>;
}
