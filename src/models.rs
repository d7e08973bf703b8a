//! Core data models used throughout lexrag.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the synchronization and retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkingStrategy;

/// A document as delivered by the upstream corpus snapshot, before any
/// processing.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub id: String,
    pub title: String,
    pub raw_text: String,
}

/// Processing status of a (document, strategy) pair.
///
/// Content problems (empty text, upstream collection failures, a failed
/// chunker) are reported through these statuses rather than as errors; the
/// sync batch continues past them.
///
/// The string forms are wire-stable: they are persisted and compared across
/// sync runs, so renaming a variant requires a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocStatus {
    /// Chunked and every chunk carries a valid embedding.
    Processed,
    /// Chunked; at least one chunk still awaits an embedding.
    PendingEmbedding,
    /// Raw text was empty or whitespace-only. No chunks.
    TextEmpty,
    /// Raw text carried an upstream collection-failure marker. No chunks.
    CollectionError,
    /// The chunker itself failed. No chunks.
    ChunkingError,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocStatus::Processed => "PROCESSED",
            DocStatus::PendingEmbedding => "PENDING_EMBEDDING",
            DocStatus::TextEmpty => "TEXT_EMPTY",
            DocStatus::CollectionError => "COLLECTION_ERROR",
            DocStatus::ChunkingError => "CHUNKING_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSED" => Some(DocStatus::Processed),
            "PENDING_EMBEDDING" => Some(DocStatus::PendingEmbedding),
            "TEXT_EMPTY" => Some(DocStatus::TextEmpty),
            "COLLECTION_ERROR" => Some(DocStatus::CollectionError),
            "CHUNKING_ERROR" => Some(DocStatus::ChunkingError),
            _ => None,
        }
    }

    /// Statuses under which a document contributes no chunks to the indexes.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            DocStatus::TextEmpty | DocStatus::CollectionError | DocStatus::ChunkingError
        )
    }
}

impl std::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized document row stored by a [`crate::store::Store`].
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    /// Hex SHA-256 of the trimmed raw text at the last sync.
    pub raw_hash: String,
    pub updated_at: i64,
}

/// Chunking outcome for one (document, strategy) pair, persisted so the next
/// sync run can decide whether re-chunking is needed without touching the
/// chunk rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingState {
    /// Hex SHA-256 of the trimmed raw text when this strategy last ran.
    pub raw_hash: String,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub status: DocStatus,
    pub num_chunks: i64,
    pub updated_at: i64,
}

/// A fragment of a document's text, produced by one chunking strategy.
///
/// `text_hash` is a pure function of `text`; it is the identity used for
/// embedding reuse across re-chunking. The `id` is a fresh UUID per row and
/// may change when a document is re-chunked.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub strategy: ChunkingStrategy,
    pub chunk_index: i64,
    pub text: String,
    pub text_hash: String,
    /// Approximate token count, used for accounting only.
    pub token_len: i64,
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`; `None` while pending.
    pub embedding_model: Option<String>,
    pub embedded_at: Option<i64>,
}

impl Chunk {
    /// An embedding counts only if it is present, tagged with the requested
    /// model, and of the declared dimensionality.
    pub fn has_valid_embedding(&self, model: &str, dims: usize) -> bool {
        match (&self.embedding, &self.embedding_model) {
            (Some(vec), Some(m)) => m == model && vec.len() == dims,
            _ => false,
        }
    }
}

/// One ranked fragment returned by the retrieval orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    /// Human-readable provenance label shown in the assembled context.
    pub source_label: String,
    pub text: String,
    pub score: f64,
}

/// One question/answer exchange kept in the session history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}
