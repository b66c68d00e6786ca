use graphloom::MAX_TRAVERSAL_HOPS;
use serde::{Deserialize, Serialize};

/// Default query parameters for a [`HybridRetriever`](crate::HybridRetriever).
///
/// Every field has a serde default, so a partial JSON object (or `{}`) is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Relation hops walked from the topic's seed entities.
    pub hops: usize,
    /// Maximum documents reported in graph context.
    pub graph_limit: usize,
    /// Chunks returned by vector search.
    pub vector_k: usize,
    /// Answer only from retrieved context.
    pub docs_only: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hops: 3,
            graph_limit: 5,
            vector_k: 3,
            docs_only: true,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.hops == 0 || self.hops > MAX_TRAVERSAL_HOPS {
            return Err(format!(
                "hops must be between 1 and {MAX_TRAVERSAL_HOPS}, got {}",
                self.hops
            ));
        }
        if self.vector_k == 0 {
            return Err("vector_k must be at least 1".to_string());
        }
        Ok(())
    }
}
