//! graphloom: embedded knowledge graph for document-derived retrieval.
//!
//! The graph has three node labels and three edge kinds:
//!
//! - **Document** nodes, keyed by source name, own **Chunk** nodes through
//!   `HAS_CHUNK` edges.
//! - **Chunk** nodes, keyed by `(document, sequence_index)`, point at every
//!   **Entity** they produced a triple about through `MENTIONS` edges.
//! - **Entity** nodes, keyed by name, are connected by typed relation edges
//!   whose type is a normalized token such as `BORN_IN`.
//!
//! Every merge primitive runs in one serialised write transaction (backed by
//! `redb`), so concurrent upserts of the same node or edge never duplicate it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use graphloom::{ChunkId, KnowledgeGraph, SeedFilter};
//!
//! let graph = KnowledgeGraph::open("corpus.graphloom").unwrap();
//!
//! let chunk = graph.create_chunk("bio.txt", 0, "Obama was born in Honolulu.").unwrap();
//! graph.upsert_relationship("Obama", "born in", "Honolulu").unwrap();
//! graph.add_mention(&chunk, "Obama").unwrap();
//! graph.add_mention(&chunk, "Honolulu").unwrap();
//!
//! let rows = graph
//!     .traverse(&SeedFilter::contains("Honolulu"), 1, 5)
//!     .unwrap();
//! assert_eq!(rows[0].document, "bio.txt");
//! ```

mod relation;
mod vector;

pub use relation::{normalize_relation, RelationType, DEFAULT_RELATION};
pub use vector::{VectorHit, VectorIndex};

use chrono::{DateTime, Utc};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeGraphError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("max_hops must be between 1 and {max}, got {requested}")]
    InvalidHops { requested: usize, max: usize },
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
}

impl From<redb::DatabaseError> for KnowledgeGraphError {
    fn from(e: redb::DatabaseError) -> Self {
        KnowledgeGraphError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for KnowledgeGraphError {
    fn from(e: redb::TransactionError) -> Self {
        KnowledgeGraphError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for KnowledgeGraphError {
    fn from(e: redb::TableError) -> Self {
        KnowledgeGraphError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for KnowledgeGraphError {
    fn from(e: redb::StorageError) -> Self {
        KnowledgeGraphError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for KnowledgeGraphError {
    fn from(e: redb::CommitError) -> Self {
        KnowledgeGraphError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KnowledgeGraphError>;

/// Upper bound accepted for `max_hops` in traversal calls.
///
/// Traversal cost grows with branching factor to the power of the hop count.
pub const MAX_TRAVERSAL_HOPS: usize = 5;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Stable chunk identity derived from the owning document and the chunk's
/// position within it. Re-ingesting the same document yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document: String,
    pub index: u64,
}

impl ChunkId {
    pub fn new(document: impl Into<String>, index: u64) -> Self {
        Self {
            document: document.into(),
            index,
        }
    }

    /// Storage key. The zero-padded index keeps a document's chunks in
    /// sequence order under byte-wise key comparison.
    fn key(&self) -> String {
        format!("{}{SEP}{:020}", self.document, self.index)
    }

    fn from_key(key: &str) -> Option<Self> {
        let (document, index) = key.rsplit_once(SEP)?;
        Some(Self::new(document, index.parse().ok()?))
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.document, self.index)
    }
}

/// Outcome of a merge-or-create write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The node or edge did not exist and was written.
    Created,
    /// The node or edge already existed; nothing changed.
    Existing,
}

impl Upsert {
    pub fn is_created(self) -> bool {
        matches!(self, Upsert::Created)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkNode {
    pub id: ChunkId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub subject: String,
    pub relation: RelationType,
    pub object: String,
    pub created_at: DateTime<Utc>,
}

/// Which entities seed a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedFilter {
    /// Entity name contains the keyword (case-sensitive).
    Contains(String),
    /// Entity name contains the keyword, ignoring case.
    ContainsIgnoreCase(String),
    /// Entity name equals the given name.
    Exact(String),
}

impl SeedFilter {
    pub fn contains(keyword: impl Into<String>) -> Self {
        SeedFilter::Contains(keyword.into())
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            SeedFilter::Contains(k) => name.contains(k.as_str()),
            SeedFilter::ContainsIgnoreCase(k) => {
                name.to_lowercase().contains(&k.to_lowercase())
            }
            SeedFilter::Exact(n) => name == n,
        }
    }
}

/// One traversal result row: a document and the reachable entities its
/// chunks mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntities {
    pub document: String,
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub documents: u64,
    pub chunks: u64,
    pub entities: u64,
    pub relations: u64,
    pub mentions: u64,
}

/// Result of [`KnowledgeGraph::delete_all`]. Each table is cleared in its own
/// transaction; a failure on one does not stop the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub cleared: Vec<String>,
    /// `(table, error)` pairs for tables that could not be cleared.
    pub failures: Vec<(String, String)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Counts of what [`KnowledgeGraph::delete_document`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DocumentRemoval {
    pub chunks: usize,
    pub mentions: usize,
    pub entities: usize,
    pub relations: usize,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Separator between the parts of composite edge keys. Names may not contain it.
const SEP: char = '\u{1f}';
/// The character right after [`SEP`]; exclusive upper bound for prefix scans.
const SEP_NEXT: char = '\u{20}';

/// Node tables: key is the node's identity, value is the node as JSON.
const DOCUMENTS: TableDefinition<&str, &str> = TableDefinition::new("documents");
/// Keyed by [`ChunkId::key`], so a document's chunks are contiguous.
const CHUNKS: TableDefinition<&str, &str> = TableDefinition::new("chunks");
const ENTITIES: TableDefinition<&str, &str> = TableDefinition::new("entities");

/// `"{document}␟{chunk_key}"` → `""`.
const HAS_CHUNK: TableDefinition<&str, &str> = TableDefinition::new("has_chunk");
/// `"{entity}␟{chunk_key}"` → `""`.
const MENTIONS_BY_ENTITY: TableDefinition<&str, &str> =
    TableDefinition::new("mentions_by_entity");
/// `"{chunk_key}␟{entity}"` → `""`. Written together with the entity-side row.
const MENTIONS_BY_CHUNK: TableDefinition<&str, &str> = TableDefinition::new("mentions_by_chunk");
/// `"{subject}␟{relation}␟{object}"` → edge JSON. The key makes the edge
/// unique per type and ordered pair.
const RELATIONS: TableDefinition<&str, &str> = TableDefinition::new("relations");
/// `"{object}␟{relation}␟{subject}"` → `""`. Reverse adjacency for undirected walks.
const RELATIONS_BY_OBJECT: TableDefinition<&str, &str> =
    TableDefinition::new("relations_by_object");

/// Clearing order for [`KnowledgeGraph::delete_all`]: edges before nodes.
const CLEAR_ORDER: [(&str, TableDefinition<&str, &str>); 8] = [
    ("relations", RELATIONS),
    ("relations_by_object", RELATIONS_BY_OBJECT),
    ("mentions_by_entity", MENTIONS_BY_ENTITY),
    ("mentions_by_chunk", MENTIONS_BY_CHUNK),
    ("has_chunk", HAS_CHUNK),
    ("chunks", CHUNKS),
    ("entities", ENTITIES),
    ("documents", DOCUMENTS),
];

fn join_key(parts: &[&str]) -> String {
    parts.join(&SEP.to_string())
}

/// Half-open key range covering every key that starts with `"{head}␟"`.
fn prefix_bounds(head: &str) -> (String, String) {
    (format!("{head}{SEP}"), format!("{head}{SEP_NEXT}"))
}

fn keys_with_prefix<T>(table: &T, head: &str) -> Result<Vec<String>>
where
    T: ReadableTable<&'static str, &'static str>,
{
    let (start, end) = prefix_bounds(head);
    let mut keys = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (k, _v) = entry?;
        keys.push(k.value().to_string());
    }
    Ok(keys)
}

/// Entities adjacent to `name` over relation edges, in either direction.
/// Entities one edge away from `name`, in either direction. The flag is set
/// when `name` has any edge at all, self-loops included.
fn neighbors<T, R>(relations: &T, reverse: &R, name: &str) -> Result<(Vec<String>, bool)>
where
    T: ReadableTable<&'static str, &'static str>,
    R: ReadableTable<&'static str, &'static str>,
{
    let mut out = Vec::new();
    let mut has_edge = false;
    for key in keys_with_prefix(relations, name)?
        .into_iter()
        .chain(keys_with_prefix(reverse, name)?)
    {
        if let Some((_, other)) = key.rsplit_once(SEP) {
            has_edge = true;
            if other != name && !out.iter().any(|o| o == other) {
                out.push(other.to_string());
            }
        }
    }
    Ok((out, has_edge))
}

fn validate_name<'a>(kind: &str, name: &'a str) -> Result<&'a str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(KnowledgeGraphError::InvalidInput(format!(
            "{kind} name must not be empty"
        )));
    }
    if trimmed.contains(SEP) {
        return Err(KnowledgeGraphError::InvalidInput(format!(
            "{kind} name must not contain the unit separator character"
        )));
    }
    Ok(trimmed)
}

fn validate_hops(max_hops: usize) -> Result<()> {
    if max_hops == 0 || max_hops > MAX_TRAVERSAL_HOPS {
        return Err(KnowledgeGraphError::InvalidHops {
            requested: max_hops,
            max: MAX_TRAVERSAL_HOPS,
        });
    }
    Ok(())
}

/// An entity reached by a traversal and the shortest path that reached it.
struct Reached {
    name: String,
    path: Vec<String>,
}

/// Embedded knowledge graph store.
///
/// An embedded, serverless store for Document, Chunk, and Entity nodes and
/// the edges between them. All writes are ACID (backed by `redb`). Cheap to
/// share across threads by reference; redb serialises write transactions.
///
/// # Example
///
/// ```rust,no_run
/// use graphloom::KnowledgeGraph;
///
/// let graph = KnowledgeGraph::open_in_memory().unwrap();
/// graph.upsert_entity("Alice").unwrap();
/// graph.upsert_entity("Alice").unwrap();
/// assert_eq!(graph.stats().unwrap().entities, 1);
/// ```
pub struct KnowledgeGraph {
    db: Database,
}

impl KnowledgeGraph {
    /// Open or create a graph database at the given path.
    pub fn open(path: &str) -> Result<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Create an in-memory graph (no file I/O). Data is lost on drop.
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        let write_txn = db.begin_write()?;
        for (_, table) in CLEAR_ORDER {
            write_txn.open_table(table)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Merge primitives
    // -----------------------------------------------------------------------

    /// Merge a name-keyed node inside an open write transaction.
    fn merge_named_in_txn(
        write_txn: &WriteTransaction,
        table: TableDefinition<&str, &str>,
        name: &str,
        to_json: impl FnOnce() -> Result<String>,
    ) -> Result<Upsert> {
        let mut table = write_txn.open_table(table)?;
        let exists = table.get(name)?.is_some();
        if exists {
            return Ok(Upsert::Existing);
        }
        let json = to_json()?;
        table.insert(name, json.as_str())?;
        Ok(Upsert::Created)
    }

    fn merge_document_in_txn(write_txn: &WriteTransaction, name: &str) -> Result<Upsert> {
        Self::merge_named_in_txn(write_txn, DOCUMENTS, name, || {
            Ok(serde_json::to_string(&DocumentNode {
                name: name.to_string(),
                created_at: Utc::now(),
            })?)
        })
    }

    fn merge_entity_in_txn(write_txn: &WriteTransaction, name: &str) -> Result<Upsert> {
        Self::merge_named_in_txn(write_txn, ENTITIES, name, || {
            Ok(serde_json::to_string(&EntityNode {
                name: name.to_string(),
                created_at: Utc::now(),
            })?)
        })
    }

    /// Merge-or-create a Document node. Idempotent.
    pub fn upsert_document(&self, name: &str) -> Result<Upsert> {
        let name = validate_name("document", name)?;
        let write_txn = self.db.begin_write()?;
        let outcome = Self::merge_document_in_txn(&write_txn, name)?;
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Merge-or-create an Entity node. Idempotent.
    pub fn upsert_entity(&self, name: &str) -> Result<Upsert> {
        let name = validate_name("entity", name)?;
        let write_txn = self.db.begin_write()?;
        let outcome = Self::merge_entity_in_txn(&write_txn, name)?;
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Store chunk `index` of `document` and link it with `HAS_CHUNK`.
    ///
    /// The owning document is merged in the same transaction, so a chunk
    /// never exists without its document. Storing an existing [`ChunkId`]
    /// again replaces its text and drops its previous `MENTIONS` edges, so
    /// re-ingestion re-derives mentions instead of duplicating the chunk.
    pub fn create_chunk(&self, document: &str, index: u64, text: &str) -> Result<ChunkId> {
        let document = validate_name("document", document)?;
        let id = ChunkId::new(document, index);
        let chunk_key = id.key();

        let write_txn = self.db.begin_write()?;
        Self::merge_document_in_txn(&write_txn, document)?;

        let replaced = {
            let mut chunks = write_txn.open_table(CHUNKS)?;
            let replaced = chunks.get(chunk_key.as_str())?.is_some();
            let node = ChunkNode {
                id: id.clone(),
                text: text.to_string(),
                created_at: Utc::now(),
            };
            let json = serde_json::to_string(&node)?;
            chunks.insert(chunk_key.as_str(), json.as_str())?;
            replaced
        };

        if replaced {
            let dropped = Self::drop_chunk_mentions_in_txn(&write_txn, &chunk_key)?;
            debug!(chunk = %id, dropped_mentions = dropped.len(), "replaced existing chunk");
        }

        {
            let mut has_chunk = write_txn.open_table(HAS_CHUNK)?;
            let key = join_key(&[document, &chunk_key]);
            has_chunk.insert(key.as_str(), "")?;
        }

        write_txn.commit()?;
        Ok(id)
    }

    /// Remove every `MENTIONS` edge from the chunk and return the entities
    /// that were mentioned.
    fn drop_chunk_mentions_in_txn(
        write_txn: &WriteTransaction,
        chunk_key: &str,
    ) -> Result<Vec<String>> {
        let mut by_chunk = write_txn.open_table(MENTIONS_BY_CHUNK)?;
        let mut by_entity = write_txn.open_table(MENTIONS_BY_ENTITY)?;
        let prefix = format!("{chunk_key}{SEP}");
        let keys = keys_with_prefix(&by_chunk, chunk_key)?;

        let mut entities = Vec::with_capacity(keys.len());
        for key in keys {
            by_chunk.remove(key.as_str())?;
            if let Some(entity) = key.strip_prefix(prefix.as_str()) {
                by_entity.remove(join_key(&[entity, chunk_key]).as_str())?;
                entities.push(entity.to_string());
            }
        }
        Ok(entities)
    }

    /// Merge both endpoint entities, then merge the typed edge between them.
    ///
    /// `relation` is normalized with [`normalize_relation`]. Calling this
    /// twice with the same arguments leaves exactly one edge of that type
    /// between the ordered pair; edges of other types are unaffected.
    pub fn upsert_relationship(
        &self,
        subject: &str,
        relation: &str,
        object: &str,
    ) -> Result<Upsert> {
        let subject = validate_name("entity", subject)?;
        let object = validate_name("entity", object)?;
        let relation = RelationType::normalize(relation);

        let write_txn = self.db.begin_write()?;
        Self::merge_entity_in_txn(&write_txn, subject)?;
        Self::merge_entity_in_txn(&write_txn, object)?;

        let outcome = {
            let mut relations = write_txn.open_table(RELATIONS)?;
            let key = join_key(&[subject, relation.as_str(), object]);
            let exists = relations.get(key.as_str())?.is_some();
            if exists {
                Upsert::Existing
            } else {
                let edge = RelationEdge {
                    subject: subject.to_string(),
                    relation: relation.clone(),
                    object: object.to_string(),
                    created_at: Utc::now(),
                };
                let json = serde_json::to_string(&edge)?;
                relations.insert(key.as_str(), json.as_str())?;

                let mut reverse = write_txn.open_table(RELATIONS_BY_OBJECT)?;
                let reverse_key = join_key(&[object, relation.as_str(), subject]);
                reverse.insert(reverse_key.as_str(), "")?;
                Upsert::Created
            }
        };

        write_txn.commit()?;
        Ok(outcome)
    }

    /// Merge a `MENTIONS` edge from an existing chunk to `entity`, creating
    /// the entity if needed. Idempotent.
    pub fn add_mention(&self, chunk: &ChunkId, entity: &str) -> Result<Upsert> {
        let entity = validate_name("entity", entity)?;
        let chunk_key = chunk.key();

        let write_txn = self.db.begin_write()?;
        {
            let chunks = write_txn.open_table(CHUNKS)?;
            let exists = chunks.get(chunk_key.as_str())?.is_some();
            if !exists {
                return Err(KnowledgeGraphError::NotFound(format!("chunk {chunk}")));
            }
        }
        Self::merge_entity_in_txn(&write_txn, entity)?;

        let outcome = {
            let mut by_entity = write_txn.open_table(MENTIONS_BY_ENTITY)?;
            let key = join_key(&[entity, &chunk_key]);
            let exists = by_entity.get(key.as_str())?.is_some();
            if exists {
                Upsert::Existing
            } else {
                by_entity.insert(key.as_str(), "")?;
                let mut by_chunk = write_txn.open_table(MENTIONS_BY_CHUNK)?;
                by_chunk.insert(join_key(&[&chunk_key, entity]).as_str(), "")?;
                Upsert::Created
            }
        };

        write_txn.commit()?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Breadth-first walk from every entity matching `seed`, up to
    /// `max_hops` undirected relation hops.
    ///
    /// Returns each reached entity once, in discovery order. A seed is
    /// reported only if it has at least one relation edge, i.e. it lies on
    /// some path of length >= 1.
    fn walk(&self, seed: &SeedFilter, max_hops: usize) -> Result<Vec<Reached>> {
        validate_hops(max_hops)?;

        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        let relations = read_txn.open_table(RELATIONS)?;
        let reverse = read_txn.open_table(RELATIONS_BY_OBJECT)?;

        let mut seeds = Vec::new();
        for entry in entities.iter()? {
            let (k, _v) = entry?;
            let name = k.value();
            if seed.matches(name) {
                seeds.push(name.to_string());
            }
        }

        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut queue: VecDeque<Vec<String>> = seeds.iter().map(|s| vec![s.clone()]).collect();
        let mut reached = Vec::new();

        while let Some(path) = queue.pop_front() {
            let depth = path.len() - 1;
            if depth >= max_hops {
                continue;
            }
            let Some(current) = path.last() else {
                continue;
            };
            let (adjacent, has_edge) = neighbors(&relations, &reverse, current)?;
            if depth == 0 && has_edge {
                reached.push(Reached {
                    name: current.clone(),
                    path: path.clone(),
                });
            }
            for next in adjacent {
                if visited.insert(next.clone()) {
                    let mut next_path = path.clone();
                    next_path.push(next.clone());
                    reached.push(Reached {
                        name: next,
                        path: next_path.clone(),
                    });
                    queue.push_back(next_path);
                }
            }
        }

        Ok(reached)
    }

    /// Find the entities within `max_hops` of any entity matching `seed`
    /// and group them by the documents whose chunks mention them.
    ///
    /// Each document appears at most once and each entity at most once per
    /// document, however many paths reach it. Rows are ordered by document
    /// name and capped at `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeGraphError::InvalidHops`] unless
    /// `1 <= max_hops <= MAX_TRAVERSAL_HOPS`.
    pub fn traverse(
        &self,
        seed: &SeedFilter,
        max_hops: usize,
        limit: usize,
    ) -> Result<Vec<DocumentEntities>> {
        let reached = self.walk(seed, max_hops)?;
        if limit == 0 || reached.is_empty() {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let mentions = read_txn.open_table(MENTIONS_BY_ENTITY)?;

        let mut by_document: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entity in &reached {
            let prefix = format!("{}{SEP}", entity.name);
            let mut seen_docs: HashSet<String> = HashSet::new();
            for key in keys_with_prefix(&mentions, &entity.name)? {
                let Some(chunk) = key
                    .strip_prefix(prefix.as_str())
                    .and_then(ChunkId::from_key)
                else {
                    continue;
                };
                if seen_docs.insert(chunk.document.clone()) {
                    by_document
                        .entry(chunk.document)
                        .or_default()
                        .push(entity.name.clone());
                }
            }
        }

        Ok(by_document
            .into_iter()
            .take(limit)
            .map(|(document, entities)| DocumentEntities { document, entities })
            .collect())
    }

    /// Shortest entity-name paths from a seed to every entity a traversal
    /// with the same arguments reaches, in discovery order, capped at `limit`.
    pub fn traversal_paths(
        &self,
        seed: &SeedFilter,
        max_hops: usize,
        limit: usize,
    ) -> Result<Vec<Vec<String>>> {
        Ok(self
            .walk(seed, max_hops)?
            .into_iter()
            .filter(|r| r.path.len() > 1)
            .map(|r| r.path)
            .take(limit)
            .collect())
    }

    /// Texts of the chunks whose document name contains `keyword`
    /// (case-sensitive), in document then sequence order, capped at `limit`.
    pub fn retrieve_by_document_keyword(&self, keyword: &str, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let read_txn = self.db.begin_read()?;
        let chunks = read_txn.open_table(CHUNKS)?;
        let mut texts = Vec::new();
        for entry in chunks.iter()? {
            let (_k, v) = entry?;
            let chunk: ChunkNode = serde_json::from_str(v.value())?;
            if chunk.id.document.contains(keyword) {
                texts.push(chunk.text);
                if texts.len() == limit {
                    break;
                }
            }
        }
        Ok(texts)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    fn clear_table(&self, table: TableDefinition<&str, &str>) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            table.retain(|_, _| false)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove every edge, then every Document, Chunk, and Entity node.
    ///
    /// Each table is cleared in its own transaction. A failure is logged and
    /// recorded in the report, and clearing continues with the next table.
    pub fn delete_all(&self) -> DeleteReport {
        let mut report = DeleteReport::default();
        for (name, table) in CLEAR_ORDER {
            match self.clear_table(table) {
                Ok(()) => report.cleared.push(name.to_string()),
                Err(e) => {
                    warn!(table = name, error = %e, "failed to clear table");
                    report.failures.push((name.to_string(), e.to_string()));
                }
            }
        }
        info!(
            cleared = report.cleared.len(),
            failed = report.failures.len(),
            "deleted corpus"
        );
        report
    }

    /// Delete one document and everything that only it contributed.
    ///
    /// Removes the document's chunks with their `HAS_CHUNK` and `MENTIONS`
    /// edges, then every entity no longer mentioned by any chunk together
    /// with all relation edges touching it. Runs in one transaction.
    pub fn delete_document(&self, name: &str) -> Result<DocumentRemoval> {
        let name = validate_name("document", name)?;
        let mut removal = DocumentRemoval::default();

        let write_txn = self.db.begin_write()?;
        {
            let mut documents = write_txn.open_table(DOCUMENTS)?;
            if documents.remove(name)?.is_none() {
                return Err(KnowledgeGraphError::NotFound(format!("document {name}")));
            }
        }

        let chunk_keys: Vec<String> = {
            let mut has_chunk = write_txn.open_table(HAS_CHUNK)?;
            let prefix = format!("{name}{SEP}");
            let edge_keys = keys_with_prefix(&has_chunk, name)?;
            let mut chunk_keys = Vec::with_capacity(edge_keys.len());
            for key in edge_keys {
                has_chunk.remove(key.as_str())?;
                if let Some(chunk_key) = key.strip_prefix(prefix.as_str()) {
                    chunk_keys.push(chunk_key.to_string());
                }
            }
            chunk_keys
        };

        let mut touched: Vec<String> = Vec::new();
        for chunk_key in &chunk_keys {
            let mentioned = Self::drop_chunk_mentions_in_txn(&write_txn, chunk_key)?;
            removal.mentions += mentioned.len();
            for entity in mentioned {
                if !touched.contains(&entity) {
                    touched.push(entity);
                }
            }
            let mut chunks = write_txn.open_table(CHUNKS)?;
            if chunks.remove(chunk_key.as_str())?.is_some() {
                removal.chunks += 1;
            }
        }

        for entity in touched {
            let still_mentioned = {
                let mentions = write_txn.open_table(MENTIONS_BY_ENTITY)?;
                !keys_with_prefix(&mentions, &entity)?.is_empty()
            };
            if still_mentioned {
                continue;
            }
            removal.relations += Self::drop_entity_relations_in_txn(&write_txn, &entity)?;
            let mut entities = write_txn.open_table(ENTITIES)?;
            if entities.remove(entity.as_str())?.is_some() {
                removal.entities += 1;
            }
        }

        write_txn.commit()?;
        info!(
            document = name,
            chunks = removal.chunks,
            entities = removal.entities,
            relations = removal.relations,
            "deleted document"
        );
        Ok(removal)
    }

    /// Remove every relation edge with `entity` at either end.
    fn drop_entity_relations_in_txn(write_txn: &WriteTransaction, entity: &str) -> Result<usize> {
        let mut relations = write_txn.open_table(RELATIONS)?;
        let mut reverse = write_txn.open_table(RELATIONS_BY_OBJECT)?;
        let mut removed = 0;

        for key in keys_with_prefix(&relations, entity)? {
            relations.remove(key.as_str())?;
            if let [subject, relation, object] = key.splitn(3, SEP).collect::<Vec<_>>()[..] {
                reverse.remove(join_key(&[object, relation, subject]).as_str())?;
            }
            removed += 1;
        }
        for key in keys_with_prefix(&reverse, entity)? {
            reverse.remove(key.as_str())?;
            if let [object, relation, subject] = key.splitn(3, SEP).collect::<Vec<_>>()[..] {
                if relations
                    .remove(join_key(&[subject, relation, object]).as_str())?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Names of all documents, in name order.
    pub fn document_names(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let documents = read_txn.open_table(DOCUMENTS)?;
        let mut names = Vec::new();
        for entry in documents.iter()? {
            let (k, _v) = entry?;
            names.push(k.value().to_string());
        }
        Ok(names)
    }

    /// Chunks of one document, in sequence order.
    pub fn chunks_of(&self, document: &str) -> Result<Vec<ChunkNode>> {
        let read_txn = self.db.begin_read()?;
        let chunks = read_txn.open_table(CHUNKS)?;
        let (start, end) = prefix_bounds(document);
        let mut out = Vec::new();
        for entry in chunks.range(start.as_str()..end.as_str())? {
            let (_k, v) = entry?;
            out.push(serde_json::from_str(v.value())?);
        }
        Ok(out)
    }

    /// Every chunk in the corpus, in document then sequence order.
    pub fn all_chunks(&self) -> Result<Vec<ChunkNode>> {
        let read_txn = self.db.begin_read()?;
        let chunks = read_txn.open_table(CHUNKS)?;
        let mut out = Vec::new();
        for entry in chunks.iter()? {
            let (_k, v) = entry?;
            out.push(serde_json::from_str(v.value())?);
        }
        Ok(out)
    }

    pub fn entity(&self, name: &str) -> Result<Option<EntityNode>> {
        let read_txn = self.db.begin_read()?;
        let entities = read_txn.open_table(ENTITIES)?;
        let json: Option<String> = entities.get(name)?.map(|g| g.value().to_string());
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(Into::into)
    }

    /// Outgoing relation edges of `subject`, ordered by relation type then object.
    pub fn relations_from(&self, subject: &str) -> Result<Vec<RelationEdge>> {
        let read_txn = self.db.begin_read()?;
        let relations = read_txn.open_table(RELATIONS)?;
        let (start, end) = prefix_bounds(subject);
        let mut out = Vec::new();
        for entry in relations.range(start.as_str()..end.as_str())? {
            let (_k, v) = entry?;
            out.push(serde_json::from_str(v.value())?);
        }
        Ok(out)
    }

    /// Entities the chunk has `MENTIONS` edges to, in name order.
    pub fn mentions_of(&self, chunk: &ChunkId) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let by_chunk = read_txn.open_table(MENTIONS_BY_CHUNK)?;
        let chunk_key = chunk.key();
        let prefix = format!("{chunk_key}{SEP}");
        Ok(keys_with_prefix(&by_chunk, &chunk_key)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect())
    }

    pub fn stats(&self) -> Result<GraphStats> {
        let read_txn = self.db.begin_read()?;
        Ok(GraphStats {
            documents: read_txn.open_table(DOCUMENTS)?.len()?,
            chunks: read_txn.open_table(CHUNKS)?.len()?,
            entities: read_txn.open_table(ENTITIES)?.len()?,
            relations: read_txn.open_table(RELATIONS)?.len()?,
            mentions: read_txn.open_table(MENTIONS_BY_ENTITY)?.len()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_temp_graph() -> (KnowledgeGraph, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let graph = KnowledgeGraph::open(&path).unwrap();
        (graph, file)
    }

    /// Store a chunk and record the triple plus both mentions, the way
    /// ingestion does.
    fn ingest_triple(graph: &KnowledgeGraph, chunk: &ChunkId, s: &str, r: &str, o: &str) {
        graph.upsert_relationship(s, r, o).unwrap();
        graph.add_mention(chunk, s).unwrap();
        graph.add_mention(chunk, o).unwrap();
    }

    #[test]
    fn upsert_entity_is_idempotent() {
        let (graph, _tmp) = open_temp_graph();
        assert_eq!(graph.upsert_entity("Alice").unwrap(), Upsert::Created);
        assert_eq!(graph.upsert_entity("Alice").unwrap(), Upsert::Existing);
        assert_eq!(graph.stats().unwrap().entities, 1);
        assert_eq!(graph.entity("Alice").unwrap().unwrap().name, "Alice");
    }

    #[test]
    fn upsert_document_is_idempotent() {
        let (graph, _tmp) = open_temp_graph();
        graph.upsert_document("bio.txt").unwrap();
        graph.upsert_document("bio.txt").unwrap();
        assert_eq!(graph.document_names().unwrap(), vec!["bio.txt"]);
    }

    #[test]
    fn blank_names_are_rejected() {
        let (graph, _tmp) = open_temp_graph();
        assert!(matches!(
            graph.upsert_entity("  "),
            Err(KnowledgeGraphError::InvalidInput(_))
        ));
        assert!(matches!(
            graph.create_chunk("", 0, "text"),
            Err(KnowledgeGraphError::InvalidInput(_))
        ));
        assert!(graph.upsert_entity("a\u{1f}b").is_err());
    }

    #[test]
    fn relationship_upsert_does_not_duplicate_same_type() {
        let (graph, _tmp) = open_temp_graph();
        assert!(graph
            .upsert_relationship("Alice", "BORN_IN", "Honolulu")
            .unwrap()
            .is_created());
        assert_eq!(
            graph
                .upsert_relationship("Alice", "BORN_IN", "Honolulu")
                .unwrap(),
            Upsert::Existing
        );

        let edges = graph.relations_from("Alice").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relation.as_str(), "BORN_IN");
        assert_eq!(edges[0].object, "Honolulu");
        assert_eq!(graph.stats().unwrap().entities, 2);
    }

    #[test]
    fn relationship_types_are_normalized_and_distinct() {
        let (graph, _tmp) = open_temp_graph();
        graph
            .upsert_relationship("Alice", "born in", "Honolulu")
            .unwrap();
        graph
            .upsert_relationship("Alice", "BORN_IN", "Honolulu")
            .unwrap();
        graph
            .upsert_relationship("Alice", "lived in", "Honolulu")
            .unwrap();
        // Reverse direction is a different ordered pair.
        graph
            .upsert_relationship("Honolulu", "born in", "Alice")
            .unwrap();

        let types: Vec<String> = graph
            .relations_from("Alice")
            .unwrap()
            .into_iter()
            .map(|e| e.relation.to_string())
            .collect();
        assert_eq!(types, vec!["BORN_IN", "LIVED_IN"]);
        assert_eq!(graph.stats().unwrap().relations, 3);
    }

    #[test]
    fn create_chunk_links_document_and_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reopen.graphloom");
        let path_str = path.to_str().unwrap();

        {
            let graph = KnowledgeGraph::open(path_str).unwrap();
            let id = graph.create_chunk("bio.txt", 0, "first").unwrap();
            assert_eq!(id.to_string(), "bio.txt#0");
        }

        let graph = KnowledgeGraph::open(path_str).unwrap();
        let chunks = graph.chunks_of("bio.txt").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "first");
        assert_eq!(graph.document_names().unwrap(), vec!["bio.txt"]);
    }

    #[test]
    fn recreating_a_chunk_replaces_text_and_mentions() {
        let (graph, _tmp) = open_temp_graph();
        let id = graph.create_chunk("bio.txt", 0, "old text").unwrap();
        graph.add_mention(&id, "Obama").unwrap();

        let again = graph.create_chunk("bio.txt", 0, "new text").unwrap();
        assert_eq!(id, again);

        let stats = graph.stats().unwrap();
        assert_eq!(stats.chunks, 1, "same chunk id must not duplicate");
        assert_eq!(stats.mentions, 0, "stale mentions are dropped");
        assert_eq!(graph.chunks_of("bio.txt").unwrap()[0].text, "new text");
    }

    #[test]
    fn chunks_keep_sequence_order() {
        let (graph, _tmp) = open_temp_graph();
        for i in [10u64, 2, 1] {
            graph.create_chunk("a.txt", i, &format!("chunk {i}")).unwrap();
        }
        graph.create_chunk("b.txt", 0, "other").unwrap();

        let indices: Vec<u64> = graph
            .chunks_of("a.txt")
            .unwrap()
            .iter()
            .map(|c| c.id.index)
            .collect();
        assert_eq!(indices, vec![1, 2, 10]);
        assert_eq!(graph.all_chunks().unwrap().len(), 4);
    }

    #[test]
    fn add_mention_requires_existing_chunk() {
        let (graph, _tmp) = open_temp_graph();
        let missing = ChunkId::new("ghost.txt", 0);
        assert!(matches!(
            graph.add_mention(&missing, "Alice"),
            Err(KnowledgeGraphError::NotFound(_))
        ));
        assert_eq!(graph.stats().unwrap().entities, 0);
    }

    #[test]
    fn add_mention_is_idempotent() {
        let (graph, _tmp) = open_temp_graph();
        let id = graph.create_chunk("bio.txt", 0, "text").unwrap();
        assert!(graph.add_mention(&id, "Alice").unwrap().is_created());
        assert_eq!(graph.add_mention(&id, "Alice").unwrap(), Upsert::Existing);
        assert_eq!(graph.mentions_of(&id).unwrap(), vec!["Alice"]);
        assert_eq!(graph.stats().unwrap().mentions, 1);
    }

    #[test]
    fn traverse_reports_documents_for_reachable_entities() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph
            .create_chunk("bio.txt", 0, "Obama was born in Honolulu.")
            .unwrap();
        ingest_triple(&graph, &c, "Obama", "born in", "Honolulu");

        let rows = graph
            .traverse(&SeedFilter::contains("Honolulu"), 1, 5)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document, "bio.txt");
        assert!(rows[0].entities.contains(&"Obama".to_string()));
        assert!(rows[0].entities.contains(&"Honolulu".to_string()));
    }

    #[test]
    fn traverse_lists_document_once_across_multiple_paths() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph.create_chunk("d.txt", 0, "E links to D twice").unwrap();
        // Two distinct paths E -> X -> T and E -> Y -> T.
        ingest_triple(&graph, &c, "E", "knows", "X");
        ingest_triple(&graph, &c, "E", "knows", "Y");
        ingest_triple(&graph, &c, "X", "knows", "T");
        ingest_triple(&graph, &c, "Y", "knows", "T");

        let rows = graph.traverse(&SeedFilter::Exact("E".into()), 2, 10).unwrap();
        assert_eq!(rows.len(), 1, "document must be listed once");
        let mut entities = rows[0].entities.clone();
        let before = entities.len();
        entities.sort();
        entities.dedup();
        assert_eq!(before, entities.len(), "entities must be distinct");
        assert_eq!(entities, vec!["E", "T", "X", "Y"]);
    }

    #[test]
    fn traverse_respects_hop_bound() {
        let (graph, _tmp) = open_temp_graph();
        let c1 = graph.create_chunk("one.txt", 0, "A-B").unwrap();
        let c2 = graph.create_chunk("two.txt", 0, "B-C").unwrap();
        ingest_triple(&graph, &c1, "A", "rel", "B");
        ingest_triple(&graph, &c2, "B", "rel", "C");
        // C is only mentioned by two.txt and is two hops from A.
        graph.create_chunk("three.txt", 0, "only C").unwrap();
        graph
            .add_mention(&ChunkId::new("three.txt", 0), "C")
            .unwrap();

        let one_hop = graph.traverse(&SeedFilter::Exact("A".into()), 1, 10).unwrap();
        let all: Vec<&String> = one_hop.iter().flat_map(|r| &r.entities).collect();
        assert!(!all.iter().any(|e| e.as_str() == "C"));
        assert!(!one_hop.iter().any(|r| r.document == "three.txt"));

        let two_hops = graph.traverse(&SeedFilter::Exact("A".into()), 2, 10).unwrap();
        let docs: Vec<&str> = two_hops.iter().map(|r| r.document.as_str()).collect();
        assert_eq!(docs, vec!["one.txt", "three.txt", "two.txt"]);
    }

    #[test]
    fn traverse_rejects_unbounded_hops() {
        let (graph, _tmp) = open_temp_graph();
        for hops in [0, MAX_TRAVERSAL_HOPS + 1] {
            assert!(matches!(
                graph.traverse(&SeedFilter::contains("x"), hops, 5),
                Err(KnowledgeGraphError::InvalidHops { .. })
            ));
        }
    }

    #[test]
    fn traverse_caps_document_rows() {
        let (graph, _tmp) = open_temp_graph();
        for i in 0..4 {
            let c = graph
                .create_chunk(&format!("doc{i}.txt"), 0, "hub")
                .unwrap();
            ingest_triple(&graph, &c, "Hub", "links", &format!("Leaf{i}"));
        }
        let rows = graph.traverse(&SeedFilter::contains("Hub"), 1, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].document, "doc0.txt");
    }

    #[test]
    fn traverse_seed_matching_modes() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph.create_chunk("bio.txt", 0, "text").unwrap();
        ingest_triple(&graph, &c, "Obama", "born in", "Honolulu");

        assert!(graph
            .traverse(&SeedFilter::contains("honolulu"), 1, 5)
            .unwrap()
            .is_empty());
        assert_eq!(
            graph
                .traverse(&SeedFilter::ContainsIgnoreCase("honolulu".into()), 1, 5)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn isolated_seed_yields_nothing() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph.create_chunk("a.txt", 0, "lonely").unwrap();
        graph.add_mention(&c, "Lonely").unwrap();
        assert!(graph
            .traverse(&SeedFilter::contains("Lonely"), 3, 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn self_loop_seed_is_reported() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph.create_chunk("n.txt", 0, "N loves N").unwrap();
        ingest_triple(&graph, &c, "N", "loves", "N");

        let rows = graph.traverse(&SeedFilter::Exact("N".into()), 1, 5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document, "n.txt");
        assert_eq!(rows[0].entities, vec!["N"]);
        assert!(graph
            .traversal_paths(&SeedFilter::Exact("N".into()), 1, 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn traversal_paths_are_shortest_paths() {
        let (graph, _tmp) = open_temp_graph();
        graph.upsert_relationship("A", "r", "B").unwrap();
        graph.upsert_relationship("B", "r", "C").unwrap();
        graph.upsert_relationship("A", "r", "C").unwrap();

        let paths = graph
            .traversal_paths(&SeedFilter::Exact("A".into()), 3, 10)
            .unwrap();
        assert_eq!(
            paths,
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "C".to_string()],
            ]
        );
    }

    #[test]
    fn retrieve_by_document_keyword_filters_and_caps() {
        let (graph, _tmp) = open_temp_graph();
        graph.create_chunk("neo4j-intro.txt", 0, "a").unwrap();
        graph.create_chunk("neo4j-intro.txt", 1, "b").unwrap();
        graph.create_chunk("other.txt", 0, "c").unwrap();

        assert_eq!(
            graph.retrieve_by_document_keyword("neo4j", 5).unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            graph.retrieve_by_document_keyword("neo4j", 1).unwrap(),
            vec!["a"]
        );
        assert!(graph
            .retrieve_by_document_keyword("Neo4j", 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn delete_all_clears_every_table() {
        let (graph, _tmp) = open_temp_graph();
        let c = graph.create_chunk("bio.txt", 0, "text").unwrap();
        ingest_triple(&graph, &c, "Obama", "born in", "Honolulu");

        let report = graph.delete_all();
        assert!(report.is_complete());
        assert_eq!(report.cleared.len(), CLEAR_ORDER.len());
        assert_eq!(report.cleared[0], "relations", "edges go first");
        assert_eq!(graph.stats().unwrap(), GraphStats::default());

        // The store stays usable afterwards.
        graph.upsert_entity("Alice").unwrap();
        assert_eq!(graph.stats().unwrap().entities, 1);
    }

    #[test]
    fn delete_document_cascades_to_orphaned_entities() {
        let (graph, _tmp) = open_temp_graph();
        let bio = graph.create_chunk("bio.txt", 0, "bio").unwrap();
        let geo = graph.create_chunk("geo.txt", 0, "geo").unwrap();
        ingest_triple(&graph, &bio, "Obama", "born in", "Honolulu");
        ingest_triple(&graph, &geo, "Honolulu", "located in", "Hawaii");

        let removal = graph.delete_document("bio.txt").unwrap();
        assert_eq!(removal.chunks, 1);
        assert_eq!(removal.mentions, 2);
        assert_eq!(removal.entities, 1, "only Obama is orphaned");
        assert_eq!(removal.relations, 1);

        assert!(graph.entity("Obama").unwrap().is_none());
        assert!(graph.entity("Honolulu").unwrap().is_some());
        assert_eq!(graph.document_names().unwrap(), vec!["geo.txt"]);
        assert_eq!(graph.relations_from("Honolulu").unwrap().len(), 1);
        let rows = graph.traverse(&SeedFilter::contains("Hawaii"), 2, 5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document, "geo.txt");
    }

    #[test]
    fn delete_unknown_document_is_not_found() {
        let (graph, _tmp) = open_temp_graph();
        assert!(matches!(
            graph.delete_document("missing.txt"),
            Err(KnowledgeGraphError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_upserts_create_one_node_and_edge() {
        let graph = KnowledgeGraph::open_in_memory().unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    graph.upsert_entity("Alice").unwrap();
                    graph
                        .upsert_relationship("Alice", "knows", "Bob")
                        .unwrap();
                });
            }
        });
        let stats = graph.stats().unwrap();
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.relations, 1);
    }
}
