//! Immutable index snapshot.
//!
//! One [`IndexSnapshot`] holds everything a query needs: a BM25 index per
//! chunking strategy, one dense index over all valid vectors, and per-chunk
//! metadata for assembling results. It is built from a [`Store`] after a
//! sync cycle and installed atomically; in-flight queries keep reading the
//! snapshot they started with.

use std::collections::HashMap;

use crate::chunk::ChunkingStrategy;
use crate::dense::{DenseEntry, DenseIndex};
use crate::error::Result;
use crate::sparse::Bm25Index;
use crate::store::Store;
use crate::text;

/// What a query needs to turn a chunk id back into a result.
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    pub document_id: String,
    pub source_label: String,
    pub text: String,
}

pub struct IndexSnapshot {
    model: String,
    dims: usize,
    sparse: HashMap<ChunkingStrategy, Bm25Index>,
    dense: DenseIndex,
    meta: HashMap<String, ChunkMeta>,
}

impl IndexSnapshot {
    /// A snapshot with no chunks, used before the first sync completes.
    pub fn empty(model: &str, dims: usize) -> Self {
        let mut sparse = HashMap::new();
        for strategy in ChunkingStrategy::all() {
            sparse.insert(strategy, Bm25Index::build(Vec::new()));
        }
        Self {
            model: model.to_string(),
            dims,
            sparse,
            dense: DenseIndex::default(),
            meta: HashMap::new(),
        }
    }

    /// Builds sparse and dense indexes for every strategy from the store.
    ///
    /// Every stored chunk enters the sparse side; only chunks with a valid
    /// vector for `model`/`dims` enter the dense side, so a chunk that is
    /// still pending can be found by keywords but never by similarity.
    pub async fn build(store: &dyn Store, model: &str, dims: usize) -> Result<Self> {
        let mut sparse = HashMap::new();
        let mut dense_entries = Vec::new();
        let mut meta = HashMap::new();

        for strategy in ChunkingStrategy::all() {
            let chunks = store.indexed_chunks(strategy).await?;
            let docs: Vec<(String, Vec<String>)> = chunks
                .iter()
                .map(|c| (c.chunk_id.clone(), text::preprocess(&c.text)))
                .collect();
            sparse.insert(strategy, Bm25Index::build(docs));

            for c in chunks {
                if let (Some(vector), Some(m)) = (&c.embedding, &c.embedding_model) {
                    if m == model && vector.len() == dims {
                        dense_entries.push(DenseEntry {
                            chunk_id: c.chunk_id.clone(),
                            strategy,
                            vector: vector.clone(),
                        });
                    }
                }
                meta.insert(
                    c.chunk_id,
                    ChunkMeta {
                        document_id: c.document_id,
                        source_label: c.source_label,
                        text: c.text,
                    },
                );
            }
        }

        Ok(Self {
            model: model.to_string(),
            dims,
            sparse,
            dense: DenseIndex::build(dense_entries),
            meta,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn sparse_for(&self, strategy: ChunkingStrategy) -> &Bm25Index {
        // Populated for every variant in both constructors.
        &self.sparse[&strategy]
    }

    pub fn dense(&self) -> &DenseIndex {
        &self.dense
    }

    pub fn meta(&self, chunk_id: &str) -> Option<&ChunkMeta> {
        self.meta.get(chunk_id)
    }

    pub fn total_chunks(&self) -> usize {
        self.meta.len()
    }
}
