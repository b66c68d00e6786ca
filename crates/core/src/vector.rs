//! In-memory vector index for chunk similarity search.
//!
//! Flat (brute-force) cosine similarity over pre-computed embeddings. Callers
//! supply embeddings; graphloom never generates them. Embedding generation is
//! the responsibility of `graphloom-retrieval` or the calling application.
//!
//! # Complexity
//! - `insert`: O(n) due to the replace-by-id check
//! - `search`: O(n·d) where d is embedding dimension
//!
//! The index is not persisted. It is rebuilt from the chunks in the graph
//! store whenever the corpus changes.

use crate::{ChunkId, KnowledgeGraphError, Result};
use serde::Serialize;

#[derive(Debug, Clone)]
struct Entry {
    id: ChunkId,
    text: String,
    embedding: Vec<f32>,
}

/// One similarity search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub id: ChunkId,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Flat vector index keyed by [`ChunkId`].
#[derive(Debug, Default, Clone)]
pub struct VectorIndex {
    entries: Vec<Entry>,
    /// Expected embedding dimension. Set on first insert; subsequent inserts are
    /// validated against it.
    dim: Option<usize>,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the embedding for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeGraphError::InvalidEmbedding`] if `embedding` is
    /// empty or its dimension differs from the first embedding inserted into
    /// this index.
    pub fn insert(&mut self, id: ChunkId, text: String, embedding: Vec<f32>) -> Result<()> {
        if embedding.is_empty() {
            return Err(KnowledgeGraphError::InvalidEmbedding(format!(
                "embedding for chunk {id} must not be empty"
            )));
        }

        match self.dim {
            None => self.dim = Some(embedding.len()),
            Some(d) if embedding.len() != d => {
                return Err(KnowledgeGraphError::InvalidEmbedding(format!(
                    "embedding dimension mismatch for chunk {id}: expected {d}, got {}",
                    embedding.len()
                )));
            }
            Some(_) => {}
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.text = text;
            entry.embedding = embedding;
        } else {
            self.entries.push(Entry {
                id,
                text,
                embedding,
            });
        }
        Ok(())
    }

    /// Return the top-`k` entries by cosine similarity to `query`.
    ///
    /// Results are in descending similarity order; ties keep insertion order.
    /// Entries whose similarity is undefined (non-finite components) are
    /// skipped. Returns an empty `Vec` if the index is empty, `k` is zero, or
    /// `query` is the zero vector.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeGraphError::InvalidEmbedding`] if `query` has a
    /// different dimension than the indexed embeddings.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(d) = self.dim {
            if query.len() != d {
                return Err(KnowledgeGraphError::InvalidEmbedding(format!(
                    "query dimension mismatch: index has dim {d}, query has {}",
                    query.len()
                )));
            }
        }

        let query_norm = l2_norm(query);
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (pos, cosine_similarity(query, &e.embedding, query_norm)))
            .filter(|(_, score)| !score.is_nan())
            .collect();

        // Stable sort keeps insertion order between equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let entry = &self.entries[pos];
                VectorHit {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Expected embedding dimension (set on first insert, `None` if empty).
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Number of entries currently in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the index contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Math helpers
// ---------------------------------------------------------------------------

/// Euclidean (L2) norm of `v`.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity between `a` and `b`.
///
/// `a_norm` is pre-computed by the caller so the same query can be scored
/// against many entries. Returns `0.0` if `b` is the zero vector or the
/// lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let b_norm = l2_norm(b);
    if b_norm == 0.0 {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
