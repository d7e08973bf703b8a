//! End-to-end pipeline tests: sync a small corpus into a store, build an
//! index snapshot, and retrieve through every search mode.

use std::sync::Arc;

use async_trait::async_trait;

use lexrag::chunk::ChunkingStrategy;
use lexrag::config::Config;
use lexrag::error::{Error, Result};
use lexrag::index::IndexSnapshot;
use lexrag::models::{DocStatus, SourceDocument, Turn};
use lexrag::provider::{EmbeddingProvider, RetryPolicy, StaticSource};
use lexrag::retrieval::{build_context, RetrievalRequest, Retriever, SearchMode, NO_RESULTS_ANSWER};
use lexrag::session::SessionStore;
use lexrag::store::{InMemoryStore, Store};
use lexrag::sync::SyncEngine;

const MODEL: &str = "axis";
const DIMS: usize = 4;

/// Embeds any text onto a topic axis: "licitação" texts on axis 0,
/// "contrato" texts on axis 1, everything else on axis 2. Deterministic, so
/// dense retrieval behaves like a tiny topic model.
struct AxisEmbedder {
    short_vectors: bool,
}

impl AxisEmbedder {
    fn good() -> Self {
        Self {
            short_vectors: false,
        }
    }

    fn wrong_dims() -> Self {
        Self {
            short_vectors: true,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn model_name(&self) -> &str {
        MODEL
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v = if lower.contains("licitação") {
                    vec![1.0, 0.0, 0.0, 0.0]
                } else if lower.contains("contrato") {
                    vec![0.0, 1.0, 0.0, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0, 0.0]
                };
                if self.short_vectors {
                    v.truncate(DIMS / 2);
                }
                v
            })
            .collect())
    }
}

fn corpus() -> Vec<SourceDocument> {
    // ~1000 chars of text that splits into three chunks at 500/100.
    let d1_text = "A licitação exige edital público e ampla concorrência. ".repeat(18);
    // Under 500 chars, so it stays a single chunk.
    let d3_text = "O contrato administrativo define prazo, multa e rescisão. ".repeat(8);
    vec![
        SourceDocument {
            id: "d1".into(),
            title: "Lei de Licitações".into(),
            raw_text: d1_text,
        },
        SourceDocument {
            id: "d2".into(),
            title: "Documento Vazio".into(),
            raw_text: "   \n\n ".into(),
        },
        SourceDocument {
            id: "d3".into(),
            title: "Manual de Contratos".into(),
            raw_text: d3_text,
        },
    ]
}

fn config() -> Config {
    let mut config = Config::default();
    config.chunking.strategies = vec![ChunkingStrategy::Recursive500_100];
    config.embedding.model = MODEL.into();
    config.embedding.dims = DIMS;
    config.embedding.max_retries = 1;
    config.embedding.base_delay_ms = 1;
    config.sync.pass_delay_ms = 0;
    config
}

fn request(question: &str, mode: SearchMode) -> RetrievalRequest {
    RetrievalRequest {
        question: question.to_string(),
        mode,
        strategy: ChunkingStrategy::Recursive500_100,
        model: MODEL.to_string(),
        max_results: 10,
    }
}

#[tokio::test(start_paused = true)]
async fn sync_then_retrieve_across_all_modes() {
    let store = Arc::new(InMemoryStore::new());
    let engine = SyncEngine::new(store.clone(), Arc::new(AxisEmbedder::good()), config());
    let source = StaticSource::new(corpus());

    let report = engine.run(&source).await.unwrap();
    assert_eq!(report.docs_seen, 3);
    assert_eq!(report.docs_empty, 1);
    assert_eq!(report.pairs_chunked, 2);
    assert_eq!(report.chunks_written, 4);
    assert_eq!(report.embeddings_generated, 4);
    assert_eq!(report.embedding_failures, 0);

    let strategy = ChunkingStrategy::Recursive500_100;
    assert_eq!(store.chunks_for("d1", strategy).await.unwrap().len(), 3);
    assert!(store.chunks_for("d2", strategy).await.unwrap().is_empty());
    assert_eq!(store.chunks_for("d3", strategy).await.unwrap().len(), 1);

    let d1_state = store.chunking_state("d1", strategy).await.unwrap().unwrap();
    assert_eq!(d1_state.status, DocStatus::Processed);
    assert_eq!(d1_state.num_chunks, 3);
    let d2_state = store.chunking_state("d2", strategy).await.unwrap().unwrap();
    assert_eq!(d2_state.status, DocStatus::TextEmpty);

    let snapshot = IndexSnapshot::build(store.as_ref(), MODEL, DIMS)
        .await
        .unwrap();
    assert_eq!(snapshot.total_chunks(), 4);
    let retriever = Retriever::new(
        snapshot,
        Arc::new(AxisEmbedder::good()),
        RetryPolicy::no_retries(),
    );

    // Dense: the topic vector points at the licitação chunks.
    let dense = retriever
        .retrieve(&request("princípios da licitação", SearchMode::Dense))
        .await
        .unwrap();
    assert!(!dense.is_empty());
    assert_eq!(dense[0].document_id, "d1");
    assert_eq!(dense[0].source_label, "Lei de Licitações");

    // Sparse: keyword match finds the contrato chunk.
    let sparse = retriever
        .retrieve(&request("multa e rescisão do contrato", SearchMode::Sparse))
        .await
        .unwrap();
    assert_eq!(sparse[0].document_id, "d3");

    // Hybrid: both channels agree on the contrato chunk.
    let hybrid = retriever
        .retrieve(&request(
            "prazo do contrato administrativo",
            SearchMode::Hybrid,
        ))
        .await
        .unwrap();
    assert_eq!(hybrid[0].document_id, "d3");

    // The empty document never surfaces anywhere.
    for result in dense.iter().chain(sparse.iter()).chain(hybrid.iter()) {
        assert_ne!(result.document_id, "d2");
    }
}

#[tokio::test(start_paused = true)]
async fn resync_is_idempotent_and_edits_are_incremental() {
    let store = Arc::new(InMemoryStore::new());
    let engine = SyncEngine::new(store.clone(), Arc::new(AxisEmbedder::good()), config());

    engine.run(&StaticSource::new(corpus())).await.unwrap();
    let second = engine.run(&StaticSource::new(corpus())).await.unwrap();
    assert_eq!(second.pairs_chunked, 0);
    assert_eq!(second.embeddings_generated, 0);
    // d1 and d3 unchanged, d2 still empty with the same hash.
    assert_eq!(second.pairs_unchanged, 3);

    // Editing one document re-chunks only that document.
    let mut edited = corpus();
    edited[2].raw_text = "O contrato agora traz cláusula de reajuste anual. ".repeat(8);
    let third = engine.run(&StaticSource::new(edited)).await.unwrap();
    assert_eq!(third.pairs_chunked, 1);
    assert!(third.embeddings_generated >= 1);
}

#[tokio::test(start_paused = true)]
async fn wrong_dimension_provider_leaves_sparse_retrieval_working() {
    let store = Arc::new(InMemoryStore::new());
    let mut cfg = config();
    cfg.sync.stagnation_threshold = 2;
    let engine = SyncEngine::new(store.clone(), Arc::new(AxisEmbedder::wrong_dims()), cfg);

    // Every embedding comes back 2-dimensional: validation failures, chunks
    // stay pending and the loop eventually gives up.
    let result = engine.run(&StaticSource::new(corpus())).await;
    assert!(matches!(result, Err(Error::Stagnation { .. })));
    assert_eq!(store.count_pending(MODEL, DIMS).await.unwrap(), 4);

    // The chunks still exist, so keyword retrieval keeps working while the
    // dense side has nothing to offer.
    let snapshot = IndexSnapshot::build(store.as_ref(), MODEL, DIMS)
        .await
        .unwrap();
    assert!(snapshot.dense().is_empty());
    let retriever = Retriever::new(
        snapshot,
        Arc::new(AxisEmbedder::good()),
        RetryPolicy::no_retries(),
    );

    let sparse = retriever
        .retrieve(&request("edital de licitação", SearchMode::Sparse))
        .await
        .unwrap();
    assert!(!sparse.is_empty());
    let dense = retriever
        .retrieve(&request("edital de licitação", SearchMode::Dense))
        .await
        .unwrap();
    assert!(dense.is_empty());
}

#[tokio::test(start_paused = true)]
async fn context_and_session_round_out_a_chat_turn() {
    let store = Arc::new(InMemoryStore::new());
    let engine = SyncEngine::new(store.clone(), Arc::new(AxisEmbedder::good()), config());
    engine.run(&StaticSource::new(corpus())).await.unwrap();

    let snapshot = IndexSnapshot::build(store.as_ref(), MODEL, DIMS)
        .await
        .unwrap();
    let retriever = Retriever::new(
        snapshot,
        Arc::new(AxisEmbedder::good()),
        RetryPolicy::no_retries(),
    );
    let sessions = SessionStore::new(3);

    let question = "Quais as multas do contrato?";
    let results = retriever
        .retrieve(&request(question, SearchMode::Hybrid))
        .await
        .unwrap();
    let answer = match build_context(&results) {
        Some(context) => {
            assert!(context.contains("Source: Manual de Contratos"));
            "resposta gerada".to_string()
        }
        None => NO_RESULTS_ANSWER.to_string(),
    };
    sessions.record(
        "sessao-1",
        Turn {
            question: question.to_string(),
            answer,
        },
    );

    let history = sessions.history("sessao-1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].answer, "resposta gerada");

    // A question about nothing in the corpus falls back to the fixed answer.
    let nothing = retriever
        .retrieve(&request("astronomia estelar", SearchMode::Sparse))
        .await
        .unwrap();
    assert!(build_context(&nothing).is_none());
}
