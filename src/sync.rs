//! Corpus synchronization engine.
//!
//! Reconciles the upstream corpus snapshot against stored state, one
//! (document, strategy) pair at a time:
//!
//! 1. Orphaned documents (gone upstream) are cascade-deleted.
//! 2. Each document is classified: collection-failure marker →
//!    COLLECTION_ERROR, empty text → TEXT_EMPTY, otherwise chunkable.
//! 3. A pair is re-chunked only when the raw-text hash or the chunking
//!    parameters changed, or the previous run left an error status behind.
//!    Unchanged pairs are skipped without touching their chunks.
//! 4. Before re-chunking, embeddings from the previous chunk set are indexed
//!    by text hash; new chunks with identical text inherit them for free.
//! 5. Embedding passes then fill in the rest, buffering updates and flushing
//!    them in bulk. Passes repeat until nothing is pending, the pass budget
//!    runs out, or the loop stops making progress while failures continue
//!    (the stagnation guard that keeps a dead provider from spinning forever).
//!
//! Failures stay local: a bad document gets a status, a failed embedding
//! leaves its chunk pending, a dropped bulk write is counted. Only
//! stagnation aborts the run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::chunk::{self, ChunkingStrategy};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ChunkingState, DocStatus, DocumentRecord, SourceDocument};
use crate::provider::{self, DocumentSource, EmbeddingProvider, RetryPolicy};
use crate::store::{EmbeddingUpdate, Store};

/// Counters for one sync run. Pair counters are per (document, strategy).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub docs_seen: u64,
    pub docs_removed: u64,
    pub docs_empty: u64,
    pub docs_collection_error: u64,
    pub pairs_chunked: u64,
    pub pairs_unchanged: u64,
    pub chunks_written: u64,
    pub embeddings_reused: u64,
    pub embeddings_generated: u64,
    pub embedding_failures: u64,
    pub storage_failures: u64,
    pub passes: u32,
}

#[derive(Debug, Default)]
struct PassStats {
    written: u64,
    failures: u64,
    storage_failures: u64,
}

pub struct SyncEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: Config,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn EmbeddingProvider>, config: Config) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Runs one full sync cycle against the source's current snapshot.
    pub async fn run(&self, source: &dyn DocumentSource) -> Result<SyncReport> {
        let corpus = source.fetch_all().await?;
        let mut report = SyncReport::default();

        let known = self.store.list_document_ids().await?;
        let current: HashSet<&str> = corpus.iter().map(|d| d.id.as_str()).collect();
        let orphans: Vec<String> = known
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();
        if !orphans.is_empty() {
            report.docs_removed = self.store.delete_documents(&orphans).await?;
            info!(removed = report.docs_removed, "removed orphaned documents");
        }

        for doc in &corpus {
            report.docs_seen += 1;
            self.reconcile_document(doc, &mut report).await?;
        }

        self.embedding_loop(&mut report).await?;

        info!(
            docs = report.docs_seen,
            chunked = report.pairs_chunked,
            unchanged = report.pairs_unchanged,
            reused = report.embeddings_reused,
            generated = report.embeddings_generated,
            "sync complete"
        );
        Ok(report)
    }

    fn failure_marker(&self, text: &str) -> bool {
        self.config
            .chunking
            .failure_markers
            .iter()
            .any(|m| text.starts_with(m.as_str()))
    }

    async fn reconcile_document(
        &self,
        doc: &SourceDocument,
        report: &mut SyncReport,
    ) -> Result<()> {
        let trimmed = doc.raw_text.trim();
        let raw_hash = chunk::hash_text(trimmed);
        let now = Utc::now().timestamp();

        self.store
            .upsert_document(&DocumentRecord {
                id: doc.id.clone(),
                title: doc.title.clone(),
                raw_hash: raw_hash.clone(),
                updated_at: now,
            })
            .await?;

        let content_status = if self.failure_marker(trimmed) {
            Some(DocStatus::CollectionError)
        } else if trimmed.is_empty() {
            Some(DocStatus::TextEmpty)
        } else {
            None
        };

        for &strategy in &self.config.chunking.strategies {
            let prev = self.store.chunking_state(&doc.id, strategy).await?;

            if let Some(status) = content_status {
                let already_recorded = prev
                    .as_ref()
                    .map(|p| p.status == status && p.raw_hash == raw_hash)
                    .unwrap_or(false);
                if already_recorded {
                    report.pairs_unchanged += 1;
                    continue;
                }
                self.store.replace_chunks(&doc.id, strategy, &[]).await?;
                self.store
                    .set_chunking_state(
                        &doc.id,
                        strategy,
                        &ChunkingState {
                            raw_hash: raw_hash.clone(),
                            chunk_size: strategy.chunk_size() as i64,
                            chunk_overlap: strategy.chunk_overlap() as i64,
                            status,
                            num_chunks: 0,
                            updated_at: now,
                        },
                    )
                    .await?;
                continue;
            }

            if let Some(prev) = &prev {
                let unchanged = prev.raw_hash == raw_hash
                    && prev.chunk_size == strategy.chunk_size() as i64
                    && prev.chunk_overlap == strategy.chunk_overlap() as i64
                    && !prev.status.is_error();
                if unchanged {
                    report.pairs_unchanged += 1;
                    continue;
                }
            }

            self.rechunk(doc, strategy, trimmed, &raw_hash, now, report)
                .await?;
        }

        match content_status {
            Some(DocStatus::TextEmpty) => {
                report.docs_empty += 1;
                warn!(document_id = %doc.id, "document text is empty, nothing to index");
            }
            Some(DocStatus::CollectionError) => {
                report.docs_collection_error += 1;
                warn!(document_id = %doc.id, "document carries a collection-failure marker");
            }
            _ => {}
        }
        Ok(())
    }

    async fn rechunk(
        &self,
        doc: &SourceDocument,
        strategy: ChunkingStrategy,
        trimmed: &str,
        raw_hash: &str,
        now: i64,
        report: &mut SyncReport,
    ) -> Result<()> {
        let model = self.config.embedding.model.clone();
        let dims = self.config.embedding.dims;

        // Harvest reusable embeddings before the old chunk set is replaced.
        let previous = self.store.chunks_for(&doc.id, strategy).await?;
        let mut reusable: HashMap<String, (Vec<f32>, i64)> = HashMap::new();
        for prev_chunk in previous {
            if prev_chunk.has_valid_embedding(&model, dims) {
                if let Some(vector) = prev_chunk.embedding {
                    reusable.insert(
                        prev_chunk.text_hash,
                        (vector, prev_chunk.embedded_at.unwrap_or(0)),
                    );
                }
            }
        }

        let retry = RetryPolicy::from_config(&self.config.embedding);
        let mut chunks =
            chunk::chunk_document(&doc.id, trimmed, strategy, self.embedder.as_ref(), &retry)
                .await?;

        let mut reused = 0u64;
        for c in &mut chunks {
            if let Some((vector, embedded_at)) = reusable.remove(&c.text_hash) {
                c.embedding = Some(vector);
                c.embedding_model = Some(model.clone());
                c.embedded_at = Some(embedded_at);
                reused += 1;
            }
        }

        let status = if chunks.iter().all(|c| c.has_valid_embedding(&model, dims)) {
            DocStatus::Processed
        } else {
            DocStatus::PendingEmbedding
        };

        self.store.replace_chunks(&doc.id, strategy, &chunks).await?;
        self.store
            .set_chunking_state(
                &doc.id,
                strategy,
                &ChunkingState {
                    raw_hash: raw_hash.to_string(),
                    chunk_size: strategy.chunk_size() as i64,
                    chunk_overlap: strategy.chunk_overlap() as i64,
                    status,
                    num_chunks: chunks.len() as i64,
                    updated_at: now,
                },
            )
            .await?;

        report.pairs_chunked += 1;
        report.chunks_written += chunks.len() as u64;
        report.embeddings_reused += reused;
        Ok(())
    }

    /// Repeats embedding passes until nothing is pending or the run gives up.
    async fn embedding_loop(&self, report: &mut SyncReport) -> Result<()> {
        let model = &self.config.embedding.model;
        let dims = self.config.embedding.dims;

        let mut prev_pending = self.store.count_pending(model, dims).await?;
        if prev_pending == 0 {
            self.store.refresh_statuses(model, dims).await?;
            return Ok(());
        }

        let mut consecutive_no_progress = 0u32;
        for pass in 1..=self.config.sync.max_passes {
            report.passes = pass;
            let stats = self.embedding_pass().await?;
            report.embeddings_generated += stats.written;
            report.embedding_failures += stats.failures;
            report.storage_failures += stats.storage_failures;

            self.store.refresh_statuses(model, dims).await?;
            let pending = self.store.count_pending(model, dims).await?;
            info!(
                pass,
                pending,
                written = stats.written,
                failures = stats.failures,
                "embedding pass complete"
            );

            if pending == 0 {
                return Ok(());
            }
            if pending < prev_pending {
                consecutive_no_progress = 0;
            } else {
                consecutive_no_progress += 1;
                if consecutive_no_progress >= self.config.sync.stagnation_threshold {
                    error!(
                        pending,
                        passes = consecutive_no_progress,
                        "embedding loop stopped making progress"
                    );
                    return Err(Error::Stagnation {
                        passes: consecutive_no_progress,
                        pending,
                    });
                }
            }
            prev_pending = pending;

            if self.config.sync.pass_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.sync.pass_delay_ms)).await;
            }
        }

        Err(Error::Stagnation {
            passes: self.config.sync.max_passes,
            pending: prev_pending,
        })
    }

    /// One walk over all pending chunks: embed each, buffer the updates and
    /// flush in batches. A chunk that fails stays pending and the walk
    /// continues.
    async fn embedding_pass(&self) -> Result<PassStats> {
        let model = self.config.embedding.model.clone();
        let dims = self.config.embedding.dims;
        let retry = RetryPolicy::from_config(&self.config.embedding);

        let pending = self.store.pending_chunks(&model, dims).await?;
        let mut stats = PassStats::default();
        let mut buffer: Vec<EmbeddingUpdate> = Vec::new();

        for chunk in pending {
            let input = std::slice::from_ref(&chunk.text);
            match provider::embed_with_retry(self.embedder.as_ref(), input, &retry).await {
                Ok(mut vectors) => {
                    if let Some(vector) = vectors.pop() {
                        buffer.push(EmbeddingUpdate {
                            chunk_id: chunk.id,
                            model: model.clone(),
                            vector,
                            embedded_at: Utc::now().timestamp(),
                        });
                    }
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!(
                        chunk_id = %chunk.id,
                        document_id = %chunk.document_id,
                        error = %e,
                        "embedding failed, chunk stays pending"
                    );
                }
            }
            if buffer.len() >= self.config.sync.flush_every {
                self.flush(&mut buffer, &mut stats).await;
            }
        }
        self.flush(&mut buffer, &mut stats).await;
        Ok(stats)
    }

    /// Bulk-writes buffered updates with a bounded retry. When the retry
    /// budget runs out the batch is dropped and counted; its chunks stay
    /// pending and the next pass picks them up again.
    async fn flush(&self, buffer: &mut Vec<EmbeddingUpdate>, stats: &mut PassStats) {
        if buffer.is_empty() {
            return;
        }
        let mut attempt = 1u32;
        loop {
            match self.store.write_embeddings(buffer).await {
                Ok(()) => {
                    stats.written += buffer.len() as u64;
                    buffer.clear();
                    return;
                }
                Err(e) if attempt < self.config.sync.storage_retries.max(1) => {
                    warn!(attempt, error = %e, "bulk embedding write failed, retrying");
                    let delay = Duration::from_millis(100u64 << (attempt - 1).min(6));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        dropped = buffer.len(),
                        error = %e,
                        "bulk embedding write failed after retries, dropping batch"
                    );
                    stats.storage_failures += buffer.len() as u64;
                    buffer.clear();
                    return;
                }
            }
        }
    }
}
