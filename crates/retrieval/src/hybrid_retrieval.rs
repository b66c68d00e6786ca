//! Hybrid graph + vector retrieval over a document corpus.
//!
//! [`HybridRetriever`] owns a [`KnowledgeGraph`] and an in-memory
//! [`VectorIndex`] and drives both halves of the pipeline:
//!
//! - **Ingestion** stores every chunk, extracts `(subject, relation, object)`
//!   triples with a completion model, writes them as entities, typed edges and
//!   mentions, then rebuilds the vector index over the whole corpus.
//! - **Query** collects graph context (multi-hop traversal seeded by a topic)
//!   and vector context (top-k similar chunks), fuses them, and asks the
//!   completion model for an answer. In docs-only mode a query with no
//!   evidence returns a fixed message without calling the model.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use graphloom::KnowledgeGraph;
//! use graphloom_retrieval::{ChunkRecord, Completer, Embedder, HybridRetriever};
//!
//! # fn run(embedder: Arc<dyn Embedder>, completer: Arc<dyn Completer>) -> graphloom_retrieval::Result<()> {
//! let graph = KnowledgeGraph::open("./corpus.graphloom")?;
//! let retriever = HybridRetriever::new(graph, embedder, completer);
//!
//! retriever.ingest(vec![ChunkRecord::new("bio.txt", 0, "Obama was born in Honolulu.")])?;
//!
//! let request = retriever.request("Where was Obama born?").with_topic("Honolulu");
//! let answer = retriever.query(&request)?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod extractor;
pub mod intelligence;

pub use config::RetrievalConfig;
pub use extractor::{parse_triples, ExtractionError, Triple, TripleExtractor};
pub use intelligence::{ChatMessage, Completer, Embedder, IntelligenceError, Role};

use graphloom::{
    ChunkId, DeleteReport, DocumentRemoval, KnowledgeGraph, KnowledgeGraphError, SeedFilter,
    VectorIndex, MAX_TRAVERSAL_HOPS,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Graph(#[from] KnowledgeGraphError),
    #[error("vector index not built yet; ingest documents first")]
    IndexNotBuilt,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("embedding failed: {0}")]
    Embedding(#[source] IntelligenceError),
    #[error("completion failed: {0}")]
    Completion(#[source] IntelligenceError),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;

const STRICT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question \
using only the provided document context. Do not use any general knowledge beyond what is provided.";

const PERMISSIVE_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the provided document \
context to answer the question. If relevant info is missing, you may also use general knowledge.";

/// Appended to generated answers in docs-only mode.
pub const DOCS_ONLY_HINT: &str = "(Answered from the uploaded documents only; turn off docs-only mode to include general knowledge.)";

fn no_evidence_message(question: &str) -> String {
    format!(
        "The uploaded documents do not contain information about '{question}'.\n\
         Turn off docs-only mode to include general knowledge."
    )
}

/// One chunk produced by the caller's document loader and splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub source: String,
    pub index: u64,
    pub text: String,
}

impl ChunkRecord {
    pub fn new(source: impl Into<String>, index: u64, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            index,
            text: text.into(),
        }
    }
}

/// Counts from one [`HybridRetriever::ingest`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub chunks_stored: usize,
    pub chunks_failed: usize,
    pub extraction_failures: usize,
    pub triples_written: usize,
    pub triple_failures: usize,
    pub indexed_chunks: usize,
}

/// How graph context is collected for a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
    /// Multi-hop traversal from entities whose name contains the topic.
    #[default]
    Traverse,
    /// Chunk texts of documents whose name contains the topic.
    DocumentKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    /// Seeds graph retrieval. `None` (or blank) makes the query vector-only.
    pub topic: Option<String>,
    pub hops: usize,
    pub graph_limit: usize,
    pub vector_k: usize,
    pub docs_only: bool,
    pub graph_mode: GraphMode,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>, config: &RetrievalConfig) -> Self {
        Self {
            question: question.into(),
            topic: None,
            hops: config.hops,
            graph_limit: config.graph_limit,
            vector_k: config.vector_k,
            docs_only: config.docs_only,
            graph_mode: GraphMode::default(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_docs_only(mut self, docs_only: bool) -> Self {
        self.docs_only = docs_only;
        self
    }

    pub fn with_graph_mode(mut self, graph_mode: GraphMode) -> Self {
        self.graph_mode = graph_mode;
        self
    }

    fn topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(RetrievalError::InvalidRequest(
                "question must not be empty".into(),
            ));
        }
        let traverses = self.topic().is_some() && self.graph_mode == GraphMode::Traverse;
        if traverses && (self.hops == 0 || self.hops > MAX_TRAVERSAL_HOPS) {
            return Err(RetrievalError::InvalidRequest(format!(
                "hops must be between 1 and {MAX_TRAVERSAL_HOPS}, got {}",
                self.hops
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The completion model produced the text.
    Generated,
    /// Docs-only mode found no evidence; the model was not called.
    NoEvidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub graph_context: String,
    pub vector_context: String,
}

/// Graph + vector retrieval orchestrator.
///
/// The vector index is held as an `Arc` behind a lock. A rebuild embeds the
/// whole corpus first and swaps the new index in with one assignment, so a
/// concurrent query sees either the old index or the new one. Rebuilds are
/// serialized: the swapped-in index always reflects a snapshot taken after
/// every earlier rebuild finished.
pub struct HybridRetriever {
    graph: KnowledgeGraph,
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    extractor: TripleExtractor,
    index: RwLock<Option<Arc<VectorIndex>>>,
    /// Held from corpus snapshot to index swap.
    rebuild: Mutex<()>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        graph: KnowledgeGraph,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            graph,
            embedder,
            extractor: TripleExtractor::new(completer.clone()),
            completer,
            index: RwLock::new(None),
            rebuild: Mutex::new(()),
            config: RetrievalConfig::default(),
        }
    }

    /// Replace the default query parameters.
    pub fn with_config(mut self, config: RetrievalConfig) -> Result<Self> {
        config.validate().map_err(RetrievalError::InvalidRequest)?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    /// A query for `question` with this retriever's default parameters.
    pub fn request(&self, question: impl Into<String>) -> QueryRequest {
        QueryRequest::new(question, &self.config)
    }

    /// Number of chunks in the current vector index, or `None` if unbuilt.
    pub fn indexed_chunks(&self) -> Option<usize> {
        self.current_index().map(|index| index.len())
    }

    fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap_index(&self, index: Option<Arc<VectorIndex>>) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Store, enrich, and index a batch of chunks.
    ///
    /// Chunks are processed in order. A chunk that cannot be stored, a failed
    /// extraction, or a failed triple write is logged and counted; processing
    /// continues with the next triple or chunk. After the batch the vector
    /// index is rebuilt over every chunk in the store.
    ///
    /// # Errors
    ///
    /// Only an index rebuild failure is returned, after all chunks were
    /// stored. The previous index stays in place in that case.
    pub fn ingest(&self, chunks: impl IntoIterator<Item = ChunkRecord>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for chunk in chunks {
            let id = match self
                .graph
                .create_chunk(&chunk.source, chunk.index, &chunk.text)
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(source = %chunk.source, index = chunk.index, error = %e, "failed to store chunk");
                    report.chunks_failed += 1;
                    continue;
                }
            };
            report.chunks_stored += 1;

            let triples = match self.extractor.extract(&chunk.text) {
                Ok(triples) => triples,
                Err(e) => {
                    warn!(chunk = %id, error = %e, "extraction failed; chunk stored without graph enrichment");
                    report.extraction_failures += 1;
                    continue;
                }
            };
            debug!(chunk = %id, triples = triples.len(), "extracted triples");

            for triple in &triples {
                match self.write_triple(&id, triple) {
                    Ok(()) => report.triples_written += 1,
                    Err(e) => {
                        warn!(
                            chunk = %id,
                            subject = %triple.subject,
                            relation = %triple.relation,
                            object = %triple.object,
                            error = %e,
                            "failed to write triple"
                        );
                        report.triple_failures += 1;
                    }
                }
            }
        }

        report.indexed_chunks = self.rebuild_index()?;
        info!(
            stored = report.chunks_stored,
            triples = report.triples_written,
            extraction_failures = report.extraction_failures,
            indexed = report.indexed_chunks,
            "ingestion finished"
        );
        Ok(report)
    }

    fn write_triple(&self, chunk: &ChunkId, triple: &Triple) -> graphloom::Result<()> {
        self.graph
            .upsert_relationship(&triple.subject, triple.relation.as_str(), &triple.object)?;
        self.graph.add_mention(chunk, &triple.subject)?;
        self.graph.add_mention(chunk, &triple.object)?;
        Ok(())
    }

    /// Re-embed every chunk in the store and swap in the new index.
    ///
    /// Useful after reopening an existing store, since the index is not
    /// persisted. Returns the number of indexed chunks.
    pub fn rebuild_index(&self) -> Result<usize> {
        let _rebuild = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let chunks = self.graph.all_chunks()?;
        let mut index = VectorIndex::new();
        for chunk in chunks {
            let embedding = self
                .embedder
                .embed(&chunk.text)
                .map_err(RetrievalError::Embedding)?;
            index.insert(chunk.id, chunk.text, embedding)?;
        }
        let (len, dim) = (index.len(), index.dim());
        self.swap_index(Some(Arc::new(index)));
        debug!(chunks = len, dim = ?dim, "vector index rebuilt");
        Ok(len)
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Answer a question from graph and vector context.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::IndexNotBuilt`] before the first ingestion or
    ///   after [`delete_all`](Self::delete_all).
    /// - [`RetrievalError::InvalidRequest`] for an empty question or hops
    ///   outside `1..=MAX_TRAVERSAL_HOPS`.
    /// - [`RetrievalError::Embedding`] / [`RetrievalError::Completion`] when
    ///   a model call fails.
    pub fn query(&self, request: &QueryRequest) -> Result<Answer> {
        request.validate()?;
        let index = self.current_index().ok_or(RetrievalError::IndexNotBuilt)?;

        let graph_context = match request.topic() {
            Some(topic) => self.graph_context(topic, request)?,
            None => String::new(),
        };
        let vector_context = self.vector_context(&index, &request.question, request.vector_k)?;

        if request.docs_only && graph_context.trim().is_empty() && vector_context.trim().is_empty()
        {
            info!(question = %request.question, "no evidence in corpus");
            return Ok(Answer {
                text: no_evidence_message(&request.question),
                outcome: AnswerOutcome::NoEvidence,
                graph_context,
                vector_context,
            });
        }

        let context = format!("GRAPH CONTEXT:\n{graph_context}\n\nVECTOR CONTEXT:\n{vector_context}");
        let system = if request.docs_only {
            STRICT_SYSTEM_PROMPT
        } else {
            PERMISSIVE_SYSTEM_PROMPT
        };
        let messages = [
            ChatMessage::system(system),
            ChatMessage::user(format!(
                "Context:\n{}\n\nQuestion: {}",
                context.trim(),
                request.question
            )),
        ];

        let mut text = self
            .completer
            .complete(&messages)
            .map_err(RetrievalError::Completion)?;
        if request.docs_only {
            text.push('\n');
            text.push_str(DOCS_ONLY_HINT);
        }

        Ok(Answer {
            text,
            outcome: AnswerOutcome::Generated,
            graph_context,
            vector_context,
        })
    }

    /// One `"{document} mentions: {entities}"` line per contributing
    /// document, or matching chunk texts in keyword mode.
    fn graph_context(&self, topic: &str, request: &QueryRequest) -> Result<String> {
        let lines: Vec<String> = match request.graph_mode {
            GraphMode::Traverse => self
                .graph
                .traverse(
                    &SeedFilter::contains(topic),
                    request.hops,
                    request.graph_limit,
                )?
                .into_iter()
                .map(|row| format!("{} mentions: {}", row.document, row.entities.join(", ")))
                .collect(),
            GraphMode::DocumentKeyword => self
                .graph
                .retrieve_by_document_keyword(topic, request.graph_limit)?,
        };
        Ok(lines.join("\n"))
    }

    fn vector_context(&self, index: &VectorIndex, question: &str, k: usize) -> Result<String> {
        if k == 0 || index.is_empty() {
            return Ok(String::new());
        }
        let query = self
            .embedder
            .embed(question)
            .map_err(RetrievalError::Embedding)?;
        let hits = index.search(&query, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| hit.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Clear the whole corpus and drop the vector index.
    ///
    /// Partial failures are reported, not returned as errors. Queries fail
    /// with [`RetrievalError::IndexNotBuilt`] until the next ingestion.
    pub fn delete_all(&self) -> DeleteReport {
        let _rebuild = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let report = self.graph.delete_all();
        self.swap_index(None);
        report
    }

    /// Delete one document, then rebuild the index without its chunks.
    pub fn delete_document(&self, name: &str) -> Result<DocumentRemoval> {
        let removal = self.graph.delete_document(name)?;
        self.rebuild_index()?;
        Ok(removal)
    }
}
