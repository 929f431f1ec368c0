use crate::app::ports::GraphStorePort;
use crate::constants::RDF_TYPE;
use crate::error::Result;
use crate::rdf::{Term, Triple};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory graph store for dry runs and tests. Statements form a set, as in RDF.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    triples: Arc<Mutex<BTreeSet<Triple>>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.triples.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl GraphStorePort for MemoryGraph {
    async fn insert(&self, triples: &[Triple]) -> Result<()> {
        let mut store = self.triples.lock().unwrap();
        store.extend(triples.iter().cloned());
        debug!("Inserted {} statements, store holds {}", triples.len(), store.len());
        Ok(())
    }

    async fn describe(&self, subject: &str) -> Result<Vec<Triple>> {
        let store = self.triples.lock().unwrap();
        Ok(store.iter().filter(|t| t.subject == subject).cloned().collect())
    }

    async fn class_counts(&self) -> Result<Vec<(String, u64)>> {
        let store = self.triples.lock().unwrap();
        let mut subjects: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for t in store.iter().filter(|t| t.predicate == RDF_TYPE) {
            if let Term::Iri(class) = &t.object {
                subjects.entry(class.clone()).or_default().insert(&t.subject);
            }
        }
        Ok(subjects
            .into_iter()
            .map(|(class, s)| (class, s.len() as u64))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_subjects_per_class() {
        let graph = MemoryGraph::new();
        graph
            .insert(&[
                Triple::new("s:1", RDF_TYPE, Term::iri("c:Journal")),
                Triple::new("s:2", RDF_TYPE, Term::iri("c:Journal")),
                Triple::new("s:3", RDF_TYPE, Term::iri("c:Book")),
                Triple::new("s:3", "p:name", Term::plain("Proceedings")),
            ])
            .await
            .unwrap();
        // duplicates collapse
        graph
            .insert(&[Triple::new("s:1", RDF_TYPE, Term::iri("c:Journal"))])
            .await
            .unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(
            graph.class_counts().await.unwrap(),
            vec![("c:Book".to_string(), 1), ("c:Journal".to_string(), 2)]
        );
        assert_eq!(graph.describe("s:3").await.unwrap().len(), 2);
    }
}
