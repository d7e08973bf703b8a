//! In-memory dense vector index.
//!
//! Brute-force cosine similarity over stored chunk vectors, filtered by
//! chunking strategy before ranking. Like the sparse side, it is rebuilt
//! wholesale each sync cycle and never mutated by queries.

use crate::chunk::ChunkingStrategy;
use crate::provider::cosine_similarity;

pub struct DenseEntry {
    pub chunk_id: String,
    pub strategy: ChunkingStrategy,
    pub vector: Vec<f32>,
}

#[derive(Default)]
pub struct DenseIndex {
    entries: Vec<DenseEntry>,
}

impl DenseIndex {
    pub fn build(entries: Vec<DenseEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ranks chunks of one strategy by cosine similarity to the query
    /// vector, best first, truncated to `top_k`. Mismatched-dimension
    /// entries score 0 and sink naturally.
    pub fn query(
        &self,
        query_vec: &[f32],
        strategy: ChunkingStrategy,
        top_k: usize,
    ) -> Vec<(String, f32)> {
        if query_vec.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter(|e| e.strategy == strategy)
            .map(|e| (e.chunk_id.clone(), cosine_similarity(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, strategy: ChunkingStrategy, vector: Vec<f32>) -> DenseEntry {
        DenseEntry {
            chunk_id: id.to_string(),
            strategy,
            vector,
        }
    }

    #[test]
    fn ranks_by_similarity() {
        let index = DenseIndex::build(vec![
            entry("far", ChunkingStrategy::Recursive500_100, vec![0.0, 1.0]),
            entry("near", ChunkingStrategy::Recursive500_100, vec![1.0, 0.1]),
        ]);
        let hits = index.query(&[1.0, 0.0], ChunkingStrategy::Recursive500_100, 10);
        assert_eq!(hits[0].0, "near");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn filters_by_strategy() {
        let index = DenseIndex::build(vec![
            entry("a", ChunkingStrategy::Recursive500_100, vec![1.0, 0.0]),
            entry("b", ChunkingStrategy::Recursive1000_200, vec![1.0, 0.0]),
        ]);
        let hits = index.query(&[1.0, 0.0], ChunkingStrategy::Recursive1000_200, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b");
    }

    #[test]
    fn truncates_and_handles_empty() {
        let index = DenseIndex::build(vec![
            entry("a", ChunkingStrategy::Recursive500_100, vec![1.0, 0.0]),
            entry("b", ChunkingStrategy::Recursive500_100, vec![0.9, 0.1]),
            entry("c", ChunkingStrategy::Recursive500_100, vec![0.8, 0.2]),
        ]);
        assert_eq!(
            index
                .query(&[1.0, 0.0], ChunkingStrategy::Recursive500_100, 2)
                .len(),
            2
        );
        assert!(index
            .query(&[], ChunkingStrategy::Recursive500_100, 2)
            .is_empty());
        assert!(DenseIndex::default()
            .query(&[1.0, 0.0], ChunkingStrategy::Recursive500_100, 2)
            .is_empty());
    }

    #[test]
    fn mismatched_dims_score_zero() {
        let index = DenseIndex::build(vec![
            entry("good", ChunkingStrategy::Recursive500_100, vec![1.0, 0.0]),
            entry("bad", ChunkingStrategy::Recursive500_100, vec![1.0, 0.0, 0.0]),
        ]);
        let hits = index.query(&[1.0, 0.0], ChunkingStrategy::Recursive500_100, 10);
        assert_eq!(hits[0].0, "good");
        assert_eq!(hits[1].1, 0.0);
    }
}
