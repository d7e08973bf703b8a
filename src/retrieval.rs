//! Retrieval orchestrator.
//!
//! Validates requests, dispatches to the dense and sparse channels over the
//! current [`IndexSnapshot`], fuses hybrid results with reciprocal rank
//! fusion, and assembles the context block handed to a generation provider.
//!
//! The orchestrator holds no per-request state. The snapshot sits behind
//! `RwLock<Arc<...>>`: queries clone the `Arc` and keep reading a consistent
//! index even while a sync cycle installs a fresh one.
//!
//! Channel failures degrade, they do not propagate: a question that cannot
//! be embedded makes the dense channel return nothing, and in hybrid mode
//! the sparse channel still answers. Only request validation produces
//! errors.

use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::chunk::ChunkingStrategy;
use crate::error::{Error, Result};
use crate::fusion::{self, RRF_K};
use crate::index::IndexSnapshot;
use crate::models::RetrievalResult;
use crate::provider::{self, EmbeddingProvider, RetryPolicy};
use crate::text;

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 500;
pub const MAX_RESULTS: usize = 50;

/// Fixed answer used when retrieval comes back empty; the generation
/// provider is not called in that case.
pub const NO_RESULTS_ANSWER: &str =
    "No relevant information about this subject was found in the consulted documents.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Dense,
    Sparse,
    Hybrid,
}

impl SearchMode {
    /// Parses a wire string. Unknown values fall back to dense search with a
    /// warning; the caller always gets a usable mode.
    pub fn parse(s: &str) -> SearchMode {
        match s {
            "dense" => SearchMode::Dense,
            "sparse" => SearchMode::Sparse,
            "hybrid" => SearchMode::Hybrid,
            other => {
                warn!(mode = other, "unknown search mode, falling back to dense");
                SearchMode::Dense
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Dense => "dense",
            SearchMode::Sparse => "sparse",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub question: String,
    pub mode: SearchMode,
    pub strategy: ChunkingStrategy,
    /// Embedding model the caller expects; must match the snapshot's.
    pub model: String,
    pub max_results: usize,
}

impl RetrievalRequest {
    /// Request-side bounds. Violations are [`Error::Validation`], never
    /// retried and never conflated with retrieval failures.
    pub fn validate(&self) -> Result<()> {
        let len = self.question.trim().chars().count();
        if len < MIN_QUESTION_CHARS {
            return Err(Error::Validation(format!(
                "question must be at least {MIN_QUESTION_CHARS} characters"
            )));
        }
        if len > MAX_QUESTION_CHARS {
            return Err(Error::Validation(format!(
                "question must be at most {MAX_QUESTION_CHARS} characters"
            )));
        }
        if self.max_results < 1 || self.max_results > MAX_RESULTS {
            return Err(Error::Validation(format!(
                "max_results must be between 1 and {MAX_RESULTS}"
            )));
        }
        Ok(())
    }
}

pub struct Retriever {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(
        snapshot: IndexSnapshot,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            embedder,
            retry,
        }
    }

    /// Atomically swaps in a freshly built snapshot. In-flight queries keep
    /// the one they started with.
    pub fn install_snapshot(&self, snapshot: IndexSnapshot) {
        *self.snapshot.write().unwrap() = Arc::new(snapshot);
    }

    pub fn current_snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RetrievalResult>> {
        request.validate()?;
        let snapshot = self.current_snapshot();

        if snapshot.model() != request.model {
            warn!(
                requested = %request.model,
                indexed = %snapshot.model(),
                "requested embedding model does not match the index, returning nothing"
            );
            return Ok(Vec::new());
        }

        let question = request.question.trim();
        let results = match request.mode {
            SearchMode::Dense => {
                let hits = self.dense_hits(&snapshot, question, request).await;
                to_results(&snapshot, hits)
            }
            SearchMode::Sparse => {
                let hits = sparse_hits(&snapshot, question, request);
                to_results(&snapshot, hits)
            }
            SearchMode::Hybrid => {
                let dense = self.dense_hits(&snapshot, question, request).await;
                let sparse = sparse_hits(&snapshot, question, request);
                let lists = [
                    dense.into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
                    sparse.into_iter().map(|(id, _)| id).collect::<Vec<_>>(),
                ];
                let fused = fusion::reciprocal_rank_fusion(&lists, request.max_results, RRF_K);
                to_results(&snapshot, fused)
            }
        };
        Ok(results)
    }

    /// Dense channel. Provider trouble while embedding the question is
    /// logged and yields an empty list; it never fails the request.
    async fn dense_hits(
        &self,
        snapshot: &IndexSnapshot,
        question: &str,
        request: &RetrievalRequest,
    ) -> Vec<(String, f64)> {
        let texts = [question.to_string()];
        let query_vec = match provider::embed_with_retry(
            self.embedder.as_ref(),
            &texts,
            &self.retry,
        )
        .await
        {
            Ok(mut vectors) => match vectors.pop() {
                Some(v) => v,
                None => return Vec::new(),
            },
            Err(e) => {
                warn!(error = %e, "failed to embed question, dense channel returns nothing");
                return Vec::new();
            }
        };
        snapshot
            .dense()
            .query(&query_vec, request.strategy, request.max_results)
            .into_iter()
            .map(|(id, score)| (id, score as f64))
            .collect()
    }
}

fn sparse_hits(
    snapshot: &IndexSnapshot,
    question: &str,
    request: &RetrievalRequest,
) -> Vec<(String, f64)> {
    let tokens = text::preprocess(question);
    snapshot
        .sparse_for(request.strategy)
        .query(&tokens, request.max_results)
        .into_iter()
        .map(|(id, score)| (id, score as f64))
        .collect()
}

fn to_results(snapshot: &IndexSnapshot, hits: Vec<(String, f64)>) -> Vec<RetrievalResult> {
    hits.into_iter()
        .filter_map(|(chunk_id, score)| {
            snapshot.meta(&chunk_id).map(|meta| RetrievalResult {
                chunk_id,
                document_id: meta.document_id.clone(),
                source_label: meta.source_label.clone(),
                text: meta.text.clone(),
                score,
            })
        })
        .collect()
}

/// Formats retained fragments into the context block consumed by a
/// [`crate::provider::GenerationProvider`]. Returns `None` when there is
/// nothing to cite; callers answer with [`NO_RESULTS_ANSWER`] instead.
pub fn build_context(results: &[RetrievalResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let blocks: Vec<String> = results
        .iter()
        .map(|r| format!("Source: {}\nContent: {}", r.source_label, r.text))
        .collect();
    Some(format!(
        "Context for the answer (cite the 'Source' of each excerpt):\n\n{}",
        blocks.join("\n\n")
    ))
}
