//! Text chunking strategies.
//!
//! Two fixed-size recursive splitters (target size with overlap, preferring
//! paragraph then sentence then word boundaries, hard cut as last resort) and
//! two semantic splitters (breakpoints where the embedding distance between
//! adjacent sentence groups exceeds a percentile over the document).
//!
//! The semantic path talks to the embedding provider and can fail; any
//! failure degrades to a single chunk holding the whole text, so a document
//! is never lost to a chunking hiccup. The fixed path is pure and
//! deterministic.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text; the hash
//! is the identity used for embedding reuse across re-chunking.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Chunk;
use crate::provider::{self, EmbeddingProvider, RetryPolicy};
use crate::text;

/// Approximate chars-per-token ratio used for the `token_len` field.
const CHARS_PER_TOKEN: usize = 4;

/// The closed set of chunking strategies. Wire names are stable: they are
/// persisted with every chunk row and used as the sparse-index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkingStrategy {
    #[serde(rename = "recursive_1000_200")]
    Recursive1000_200,
    #[serde(rename = "recursive_500_100")]
    Recursive500_100,
    #[serde(rename = "semantic_percentile_75")]
    SemanticPercentile75,
    #[serde(rename = "semantic_percentile_95")]
    SemanticPercentile95,
}

impl ChunkingStrategy {
    pub fn all() -> [ChunkingStrategy; 4] {
        [
            ChunkingStrategy::Recursive1000_200,
            ChunkingStrategy::Recursive500_100,
            ChunkingStrategy::SemanticPercentile75,
            ChunkingStrategy::SemanticPercentile95,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChunkingStrategy::Recursive1000_200 => "recursive_1000_200",
            ChunkingStrategy::Recursive500_100 => "recursive_500_100",
            ChunkingStrategy::SemanticPercentile75 => "semantic_percentile_75",
            ChunkingStrategy::SemanticPercentile95 => "semantic_percentile_95",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recursive_1000_200" => Some(ChunkingStrategy::Recursive1000_200),
            "recursive_500_100" => Some(ChunkingStrategy::Recursive500_100),
            "semantic_percentile_75" => Some(ChunkingStrategy::SemanticPercentile75),
            "semantic_percentile_95" => Some(ChunkingStrategy::SemanticPercentile95),
            _ => None,
        }
    }

    /// Target chunk size in chars. 0 for the semantic strategies, whose
    /// geometry comes from the percentile instead.
    pub fn chunk_size(&self) -> usize {
        match self {
            ChunkingStrategy::Recursive1000_200 => 1000,
            ChunkingStrategy::Recursive500_100 => 500,
            _ => 0,
        }
    }

    pub fn chunk_overlap(&self) -> usize {
        match self {
            ChunkingStrategy::Recursive1000_200 => 200,
            ChunkingStrategy::Recursive500_100 => 100,
            _ => 0,
        }
    }

    /// Breakpoint percentile for the semantic strategies.
    pub fn percentile(&self) -> Option<f64> {
        match self {
            ChunkingStrategy::SemanticPercentile75 => Some(75.0),
            ChunkingStrategy::SemanticPercentile95 => Some(95.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hex SHA-256 of a text. Used for both document raw hashes and chunk hashes.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Runs one strategy over a document's text and materializes chunk rows with
/// contiguous indices. Empty text yields zero chunks; the caller decides what
/// status to record.
pub async fn chunk_document(
    document_id: &str,
    text: &str,
    strategy: ChunkingStrategy,
    embedder: &dyn EmbeddingProvider,
    retry: &RetryPolicy,
) -> Result<Vec<Chunk>> {
    let pieces = match strategy.percentile() {
        Some(pct) => split_semantic(text, pct, embedder, retry).await,
        None => split_recursive(text, strategy.chunk_size(), strategy.chunk_overlap()),
    };
    Ok(build_chunks(document_id, strategy, &pieces))
}

/// Assigns indices and hashes to chunk texts, skipping pieces that trim to
/// nothing so indices stay contiguous.
pub fn build_chunks(document_id: &str, strategy: ChunkingStrategy, pieces: &[String]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for piece in pieces {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        chunks.push(make_chunk(document_id, strategy, chunks.len() as i64, trimmed));
    }
    chunks
}

fn make_chunk(document_id: &str, strategy: ChunkingStrategy, index: i64, text: &str) -> Chunk {
    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        strategy,
        chunk_index: index,
        text: text.to_string(),
        text_hash: hash_text(text),
        token_len: (text.chars().count() / CHARS_PER_TOKEN) as i64,
        embedding: None,
        embedding_model: None,
        embedded_at: None,
    }
}

/// Recursive character splitter. Sizes and overlap are measured in chars;
/// operating on a char vector keeps every cut on a UTF-8 boundary, which
/// matters for accented Portuguese text.
pub fn split_recursive(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 || size == 0 {
        return Vec::new();
    }
    if n <= size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    while start < n {
        let hard_end = (start + size).min(n);
        let end = if hard_end < n {
            find_break(&chars, start, hard_end)
        } else {
            hard_end
        };
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push(trimmed.to_string());
        }
        if end >= n {
            break;
        }
        let next = end.saturating_sub(overlap);
        // Overlap must never push the window backwards.
        start = if next > start { next } else { end };
    }
    pieces
}

/// Picks the best split point inside `[start, hard_end)`: paragraph break,
/// then newline, then sentence end, then space, else the hard cut. Never
/// splits before the window's midpoint, so chunks stay near the target size.
fn find_break(chars: &[char], start: usize, hard_end: usize) -> usize {
    let floor = start + (hard_end - start) / 2;
    for i in (floor..hard_end).rev() {
        if chars[i] == '\n' && i + 1 < chars.len() && chars[i + 1] == '\n' {
            return i;
        }
    }
    for i in (floor..hard_end).rev() {
        if chars[i] == '\n' {
            return i;
        }
    }
    for i in (floor..hard_end).rev() {
        if chars[i] == '.' && i + 1 < chars.len() && chars[i + 1].is_whitespace() {
            return i + 1;
        }
    }
    for i in (floor..hard_end).rev() {
        if chars[i] == ' ' {
            return i;
        }
    }
    hard_end
}

/// Semantic splitter: embeds adjacent sentence groups and breaks where the
/// cosine distance between neighbors exceeds the document's percentile
/// threshold. Any failure falls back to one chunk with the whole text.
async fn split_semantic(
    text: &str,
    percentile: f64,
    embedder: &dyn EmbeddingProvider,
    retry: &RetryPolicy,
) -> Vec<String> {
    match try_split_semantic(text, percentile, embedder, retry).await {
        Ok(pieces) if !pieces.is_empty() => pieces,
        Ok(_) => whole_text_fallback(text),
        Err(e) => {
            warn!(error = %e, "semantic split failed, falling back to a single chunk");
            whole_text_fallback(text)
        }
    }
}

fn whole_text_fallback(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![trimmed.to_string()]
    }
}

async fn try_split_semantic(
    text: &str,
    percentile: f64,
    embedder: &dyn EmbeddingProvider,
    retry: &RetryPolicy,
) -> Result<Vec<String>> {
    let sentences = text::split_sentences(text);
    if sentences.len() <= 2 {
        return Ok(whole_text_fallback(text));
    }

    // Each sentence is embedded together with its immediate neighbors; the
    // distance signal over single sentences is too noisy to threshold.
    let grouped: Vec<String> = (0..sentences.len())
        .map(|i| {
            let lo = i.saturating_sub(1);
            let hi = (i + 2).min(sentences.len());
            sentences[lo..hi].join(" ")
        })
        .collect();

    let vectors = provider::embed_with_retry(embedder, &grouped, retry).await?;
    let distances: Vec<f64> = vectors
        .windows(2)
        .map(|w| 1.0 - provider::cosine_similarity(&w[0], &w[1]) as f64)
        .collect();
    let threshold = percentile_of(&distances, percentile);

    let mut pieces = Vec::new();
    let mut current: Vec<&str> = vec![sentences[0].as_str()];
    for (i, d) in distances.iter().enumerate() {
        if *d > threshold {
            pieces.push(current.join(" "));
            current = Vec::new();
        }
        current.push(sentences[i + 1].as_str());
    }
    pieces.push(current.join(" "));
    Ok(pieces)
}

/// Percentile with linear interpolation between closest ranks.
fn percentile_of(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::permanent("failing", "always down"))
        }
    }

    /// Embeds each text as a one-hot-ish vector keyed on its first token, so
    /// sentence groups about the same word land close together.
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("gato") {
                        vec![1.0, 0.0, 0.0, 0.0]
                    } else {
                        vec![0.0, 1.0, 0.0, 0.0]
                    }
                })
                .collect())
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::no_retries()
    }

    #[test]
    fn small_text_single_chunk() {
        let pieces = split_recursive("Texto curto.", 500, 100);
        assert_eq!(pieces, vec!["Texto curto."]);
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(split_recursive("", 500, 100).is_empty());
        assert!(split_recursive("   \n\n  ", 500, 100).is_empty());
    }

    #[test]
    fn long_text_respects_size_bound() {
        let text = "palavra ".repeat(300); // 2400 chars
        let pieces = split_recursive(&text, 500, 100);
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.chars().count() <= 500, "piece too long: {}", p.len());
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "palavra ".repeat(300);
        let pieces = split_recursive(&text, 500, 100);
        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().rev().take(40).collect::<Vec<_>>()
                .into_iter().rev().collect();
            assert!(
                pair[1].contains(tail.trim()),
                "expected overlap between consecutive chunks"
            );
        }
    }

    #[test]
    fn thousand_char_text_with_fixed_500_100_yields_three_chunks() {
        // 1000 chars of unbroken words: cuts near 500 and 900, then the tail.
        let text = "ab ".repeat(333) + "c";
        assert_eq!(text.chars().count(), 1000);
        let pieces = split_recursive(&text, 500, 100);
        assert_eq!(pieces.len(), 3);
    }

    #[test]
    fn splitter_is_deterministic() {
        let text = "Primeiro parágrafo.\n\nSegundo parágrafo bem maior que o primeiro.\n\n"
            .repeat(20);
        assert_eq!(
            split_recursive(&text, 200, 50),
            split_recursive(&text, 200, 50)
        );
    }

    #[test]
    fn accented_text_splits_on_char_boundaries() {
        let text = "ação licitação execução medição concessão ".repeat(50);
        let pieces = split_recursive(&text, 100, 20);
        assert!(!pieces.is_empty());
        // Would have panicked on a byte-offset slice inside a multibyte char.
        for p in &pieces {
            assert!(!p.is_empty());
        }
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let first = "a".repeat(300);
        let second = "b".repeat(300);
        let text = format!("{first}\n\n{second}");
        let pieces = split_recursive(&text, 400, 0);
        assert_eq!(pieces[0], first);
    }

    #[test]
    fn build_chunks_assigns_contiguous_indices_and_hashes() {
        let pieces = vec!["um".to_string(), "  ".to_string(), "dois".to_string()];
        let chunks = build_chunks("doc1", ChunkingStrategy::Recursive500_100, &pieces);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[0].text_hash, hash_text("um"));
        assert!(chunks[0].embedding.is_none());
    }

    #[test]
    fn identical_text_hashes_identically() {
        assert_eq!(hash_text("mesmo texto"), hash_text("mesmo texto"));
        assert_ne!(hash_text("um"), hash_text("outro"));
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in ChunkingStrategy::all() {
            assert_eq!(ChunkingStrategy::parse(strategy.name()), Some(strategy));
        }
        assert_eq!(ChunkingStrategy::parse("fixed_9000"), None);
    }

    #[test]
    fn percentile_interpolates() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_of(&values, 0.0), 1.0);
        assert_eq!(percentile_of(&values, 100.0), 4.0);
        assert_eq!(percentile_of(&values, 50.0), 2.5);
    }

    #[tokio::test]
    async fn semantic_failure_degrades_to_single_chunk() {
        let text = "Uma frase. Outra frase. Mais uma frase. E a última frase.";
        let chunks = chunk_document(
            "doc1",
            text,
            ChunkingStrategy::SemanticPercentile75,
            &FailingEmbedder,
            &retry(),
        )
        .await
        .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[tokio::test]
    async fn semantic_split_breaks_at_topic_shift() {
        let text = "O gato dorme. O gato come. O gato brinca. \
                    A lei dispõe sobre contratos. A lei regula licitações. A lei define prazos.";
        let chunks = chunk_document(
            "doc1",
            text,
            ChunkingStrategy::SemanticPercentile75,
            &KeywordEmbedder,
            &retry(),
        )
        .await
        .unwrap();
        assert!(chunks.len() >= 2);
        assert!(chunks[0].text.contains("gato"));
        assert!(chunks.last().unwrap().text.contains("lei"));
    }

    #[tokio::test]
    async fn semantic_short_text_stays_whole() {
        let chunks = chunk_document(
            "doc1",
            "Frase única.",
            ChunkingStrategy::SemanticPercentile95,
            &KeywordEmbedder,
            &retry(),
        )
        .await
        .unwrap();
        assert_eq!(chunks.len(), 1);
    }
}
