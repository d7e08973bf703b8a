//! In-memory BM25 (Okapi) inverted index.
//!
//! One index is built per chunking strategy from `(chunk_id, tokens)` pairs
//! and rebuilt wholesale each sync cycle; queries never mutate it. Candidates
//! with a non-positive score are excluded, so a query whose terms appear in
//! no chunk returns nothing. Ties keep insertion order (stable sort).

use std::collections::HashMap;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

pub struct Bm25Index {
    doc_ids: Vec<String>,
    doc_lens: Vec<f32>,
    avgdl: f32,
    /// term → (doc index, term frequency) postings, in insertion order.
    postings: HashMap<String, Vec<(usize, u32)>>,
}

impl Bm25Index {
    /// Builds the index from pre-tokenized documents. Order is preserved and
    /// determines tie-breaking at query time.
    pub fn build(docs: Vec<(String, Vec<String>)>) -> Self {
        let mut doc_ids = Vec::with_capacity(docs.len());
        let mut doc_lens = Vec::with_capacity(docs.len());
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();

        for (idx, (id, tokens)) in docs.into_iter().enumerate() {
            doc_lens.push(tokens.len() as f32);
            doc_ids.push(id);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }
            for (token, count) in tf {
                postings.entry(token).or_default().push((idx, count));
            }
        }

        let avgdl = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<f32>() / doc_lens.len() as f32
        };

        Self {
            doc_ids,
            doc_lens,
            avgdl,
            postings,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Scores the query tokens against every indexed document and returns up
    /// to `top_k` positive-scoring ids, best first.
    pub fn query(&self, tokens: &[String], top_k: usize) -> Vec<(String, f32)> {
        if tokens.is_empty() || self.is_empty() || self.avgdl == 0.0 {
            return Vec::new();
        }

        let n = self.doc_ids.len() as f32;
        let mut scores = vec![0.0f32; self.doc_ids.len()];

        for token in tokens {
            let Some(postings) = self.postings.get(token) else {
                continue;
            };
            let df = postings.len() as f32;
            // Lucene-style non-negative idf, so every term match contributes.
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for &(doc_idx, tf) in postings {
                let tf = tf as f32;
                let dl = self.doc_lens[doc_idx];
                let norm = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * dl / self.avgdl);
                scores[doc_idx] += idf * tf * (BM25_K1 + 1.0) / norm;
            }
        }

        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        ranked
            .into_iter()
            .map(|(idx, score)| (self.doc_ids[idx].clone(), score))
            .collect()
    }
}
