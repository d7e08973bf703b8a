//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety,
//! mirroring the SQLite backend's semantics exactly: replace-chunks swaps a
//! whole (document, strategy) set, pending queries skip error-status
//! documents, and refresh flips fully-embedded states to PROCESSED.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::chunk::ChunkingStrategy;
use crate::error::Result;
use crate::models::{Chunk, ChunkingState, DocStatus, DocumentRecord};

use super::{EmbeddingUpdate, IndexedChunk, Store};

#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    states: RwLock<HashMap<(String, ChunkingStrategy), ChunkingState>>,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_pending(&self, chunk: &Chunk, model: &str, dims: usize) -> bool {
        if chunk.has_valid_embedding(model, dims) {
            return false;
        }
        let states = self.states.read().unwrap();
        match states.get(&(chunk.document_id.clone(), chunk.strategy)) {
            Some(state) => !state.status.is_error(),
            None => false,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        self.docs
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn list_document_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.docs.read().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<u64> {
        let mut docs = self.docs.write().unwrap();
        let mut states = self.states.write().unwrap();
        let mut chunks = self.chunks.write().unwrap();
        let mut deleted = 0u64;
        for id in ids {
            if docs.remove(id).is_some() {
                deleted += 1;
            }
            states.retain(|(doc_id, _), _| doc_id != id);
            chunks.retain(|c| &c.document_id != id);
        }
        Ok(deleted)
    }

    async fn chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
    ) -> Result<Option<ChunkingState>> {
        Ok(self
            .states
            .read()
            .unwrap()
            .get(&(document_id.to_string(), strategy))
            .cloned())
    }

    async fn set_chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        state: &ChunkingState,
    ) -> Result<()> {
        self.states
            .write()
            .unwrap()
            .insert((document_id.to_string(), strategy), state.clone());
        Ok(())
    }

    async fn chunks_for(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
    ) -> Result<Vec<Chunk>> {
        let mut result: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id && c.strategy == strategy)
            .cloned()
            .collect();
        result.sort_by_key(|c| c.chunk_index);
        Ok(result)
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut stored = self.chunks.write().unwrap();
        stored.retain(|c| !(c.document_id == document_id && c.strategy == strategy));
        stored.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn pending_chunks(&self, model: &str, dims: usize) -> Result<Vec<Chunk>> {
        let mut pending: Vec<Chunk> = {
            let chunks = self.chunks.read().unwrap();
            chunks
                .iter()
                .filter(|c| self.is_pending(c, model, dims))
                .cloned()
                .collect()
        };
        pending.sort_by(|a, b| {
            (&a.document_id, a.strategy.name(), a.chunk_index)
                .cmp(&(&b.document_id, b.strategy.name(), b.chunk_index))
        });
        Ok(pending)
    }

    async fn count_pending(&self, model: &str, dims: usize) -> Result<u64> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| self.is_pending(c, model, dims))
            .count() as u64)
    }

    async fn write_embeddings(&self, updates: &[EmbeddingUpdate]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        for update in updates {
            if let Some(chunk) = chunks.iter_mut().find(|c| c.id == update.chunk_id) {
                chunk.embedding = Some(update.vector.clone());
                chunk.embedding_model = Some(update.model.clone());
                chunk.embedded_at = Some(update.embedded_at);
            }
        }
        Ok(())
    }

    async fn refresh_statuses(&self, model: &str, dims: usize) -> Result<()> {
        let chunks = self.chunks.read().unwrap();
        let mut states = self.states.write().unwrap();
        for ((doc_id, strategy), state) in states.iter_mut() {
            if state.status != DocStatus::PendingEmbedding {
                continue;
            }
            let all_embedded = chunks
                .iter()
                .filter(|c| &c.document_id == doc_id && c.strategy == *strategy)
                .all(|c| c.has_valid_embedding(model, dims));
            if all_embedded {
                state.status = DocStatus::Processed;
                state.updated_at = chrono::Utc::now().timestamp();
            }
        }
        Ok(())
    }

    async fn indexed_chunks(&self, strategy: ChunkingStrategy) -> Result<Vec<IndexedChunk>> {
        let docs = self.docs.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let mut result: Vec<IndexedChunk> = chunks
            .iter()
            .filter(|c| c.strategy == strategy)
            .map(|c| IndexedChunk {
                chunk_id: c.id.clone(),
                document_id: c.document_id.clone(),
                source_label: docs
                    .get(&c.document_id)
                    .map(|d| d.title.clone())
                    .unwrap_or_else(|| c.document_id.clone()),
                text: c.text.clone(),
                embedding: c.embedding.clone(),
                embedding_model: c.embedding_model.clone(),
            })
            .collect();
        result.sort_by(|a, b| (&a.document_id, &a.chunk_id).cmp(&(&b.document_id, &b.chunk_id)));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk;

    fn make_chunk(doc_id: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("{doc_id}-{index}"),
            document_id: doc_id.to_string(),
            strategy: ChunkingStrategy::Recursive500_100,
            chunk_index: index,
            text: text.to_string(),
            text_hash: chunk::hash_text(text),
            token_len: 1,
            embedding: None,
            embedding_model: None,
            embedded_at: None,
        }
    }

    fn pending_state() -> ChunkingState {
        ChunkingState {
            raw_hash: "h".into(),
            chunk_size: 500,
            chunk_overlap: 100,
            status: DocStatus::PendingEmbedding,
            num_chunks: 1,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn pending_lifecycle_matches_sqlite_semantics() {
        let store = InMemoryStore::new();
        let strategy = ChunkingStrategy::Recursive500_100;
        store
            .upsert_document(&DocumentRecord {
                id: "d1".into(),
                title: "T".into(),
                raw_hash: "h".into(),
                updated_at: 0,
            })
            .await
            .unwrap();
        let c = make_chunk("d1", 0, "texto");
        store.replace_chunks("d1", strategy, &[c.clone()]).await.unwrap();
        store
            .set_chunking_state("d1", strategy, &pending_state())
            .await
            .unwrap();

        assert_eq!(store.count_pending("m", 4).await.unwrap(), 1);
        store
            .write_embeddings(&[EmbeddingUpdate {
                chunk_id: c.id,
                model: "m".into(),
                vector: vec![0.1; 4],
                embedded_at: 1,
            }])
            .await
            .unwrap();
        assert_eq!(store.count_pending("m", 4).await.unwrap(), 0);

        store.refresh_statuses("m", 4).await.unwrap();
        let state = store.chunking_state("d1", strategy).await.unwrap().unwrap();
        assert_eq!(state.status, DocStatus::Processed);
    }

    #[tokio::test]
    async fn orphan_delete_removes_everything() {
        let store = InMemoryStore::new();
        let strategy = ChunkingStrategy::Recursive500_100;
        store
            .upsert_document(&DocumentRecord {
                id: "d1".into(),
                title: "T".into(),
                raw_hash: "h".into(),
                updated_at: 0,
            })
            .await
            .unwrap();
        store
            .replace_chunks("d1", strategy, &[make_chunk("d1", 0, "texto")])
            .await
            .unwrap();
        store
            .set_chunking_state("d1", strategy, &pending_state())
            .await
            .unwrap();

        assert_eq!(store.delete_documents(&["d1".into()]).await.unwrap(), 1);
        assert!(store.list_document_ids().await.unwrap().is_empty());
        assert!(store.chunks_for("d1", strategy).await.unwrap().is_empty());
    }
}
