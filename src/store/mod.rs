//! Persistence abstraction for documents, chunking state and chunks.
//!
//! [`Store`] is the seam between the sync engine and storage. Two
//! implementations ship: [`SqliteStore`] for production and
//! [`InMemoryStore`] for tests.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::chunk::ChunkingStrategy;
use crate::error::Result;
use crate::models::{Chunk, ChunkingState, DocumentRecord};

/// One embedding to attach to an existing chunk row.
#[derive(Debug, Clone)]
pub struct EmbeddingUpdate {
    pub chunk_id: String,
    pub model: String,
    pub vector: Vec<f32>,
    pub embedded_at: i64,
}

/// Chunk projection used to build the in-memory indexes: the text for the
/// sparse side, the vector (when valid) for the dense side, and the document
/// title as the provenance label.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub source_label: String,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()>;

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>>;

    async fn list_document_ids(&self) -> Result<Vec<String>>;

    /// Removes documents plus all their chunking state and chunks. Returns
    /// the number of documents deleted.
    async fn delete_documents(&self, ids: &[String]) -> Result<u64>;

    async fn chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
    ) -> Result<Option<ChunkingState>>;

    async fn set_chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        state: &ChunkingState,
    ) -> Result<()>;

    /// The current chunk set for one (document, strategy) pair, in index
    /// order. The sync engine reads this to build its embedding-reuse table
    /// before re-chunking.
    async fn chunks_for(&self, document_id: &str, strategy: ChunkingStrategy)
        -> Result<Vec<Chunk>>;

    /// Atomically replaces the chunk set for one (document, strategy) pair.
    async fn replace_chunks(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        chunks: &[Chunk],
    ) -> Result<()>;

    /// Chunks still lacking a valid embedding for `model`/`dims`, excluding
    /// documents in an error status. Deterministic order.
    async fn pending_chunks(&self, model: &str, dims: usize) -> Result<Vec<Chunk>>;

    async fn count_pending(&self, model: &str, dims: usize) -> Result<u64>;

    /// Bulk-attaches embeddings to chunk rows in one transaction.
    async fn write_embeddings(&self, updates: &[EmbeddingUpdate]) -> Result<()>;

    /// Flips PENDING_EMBEDDING states to PROCESSED where every chunk now
    /// carries a valid embedding.
    async fn refresh_statuses(&self, model: &str, dims: usize) -> Result<()>;

    /// Everything the indexes need for one strategy, joined with document
    /// titles, in (document, chunk_index) order.
    async fn indexed_chunks(&self, strategy: ChunkingStrategy) -> Result<Vec<IndexedChunk>>;
}
