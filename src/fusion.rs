//! Reciprocal rank fusion.
//!
//! Combines ranked candidate lists from heterogeneous retrieval channels
//! without comparing their raw scores: each appearance contributes
//! `1 / (k + rank + 1)` with a zero-based rank, contributions accumulate per
//! chunk id, and the fused list is sorted by total score. The same path runs
//! even when only one list is non-empty, so hybrid ranking is uniform.

use std::collections::HashMap;

/// Standard dampening constant; rank differences near the top matter, long
/// tails barely do.
pub const RRF_K: usize = 60;

/// Fuses ranked id lists into a single list of `(id, score)` pairs, best
/// first, truncated to `final_k`. Ties keep first-seen order across the
/// input lists, which makes fusion fully deterministic.
pub fn reciprocal_rank_fusion(
    lists: &[Vec<String>],
    final_k: usize,
    k: usize,
) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();

    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            let contribution = 1.0 / ((k + rank + 1) as f64);
            match scores.get_mut(id.as_str()) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(id.as_str(), contribution);
                    first_seen.push(id.as_str());
                }
            }
        }
    }

    let mut fused: Vec<(String, f64)> = first_seen
        .into_iter()
        .map(|id| (id.to_string(), scores[id]))
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(final_k);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_input_fuses_to_empty() {
        assert!(reciprocal_rank_fusion(&[], 10, RRF_K).is_empty());
        assert!(reciprocal_rank_fusion(&[vec![], vec![]], 10, RRF_K).is_empty());
    }

    #[test]
    fn single_list_preserves_order() {
        let fused = reciprocal_rank_fusion(&[ids(&["a", "b", "c"])], 10, RRF_K);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn top_rank_contribution_is_one_over_k_plus_one() {
        let fused = reciprocal_rank_fusion(&[ids(&["a"])], 10, RRF_K);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn agreement_across_lists_wins() {
        // "b" is second in both lists; "a" and "c" each lead one list.
        let fused = reciprocal_rank_fusion(
            &[ids(&["a", "b"]), ids(&["c", "b"])],
            10,
            RRF_K,
        );
        assert_eq!(fused[0].0, "b");
        assert!((fused[0].1 - 2.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn symmetric_ranks_score_equally() {
        // "a" is rank 0 then 1; "b" is rank 1 then 0.
        let fused = reciprocal_rank_fusion(
            &[ids(&["a", "b"]), ids(&["b", "a"])],
            10,
            RRF_K,
        );
        assert!((fused[0].1 - fused[1].1).abs() < 1e-12);
        // Tie resolves to first-seen order.
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn scores_depend_only_on_rank() {
        // Raw channel scores never enter fusion; only positions do.
        let sparse_order = ids(&["x", "y"]);
        let dense_order = ids(&["y", "x"]);
        let fused_a = reciprocal_rank_fusion(&[sparse_order.clone(), dense_order.clone()], 10, RRF_K);
        let fused_b = reciprocal_rank_fusion(&[dense_order, sparse_order], 10, RRF_K);
        assert_eq!(fused_a[0].1, fused_b[0].1);
        assert_eq!(fused_a[1].1, fused_b[1].1);
    }

    #[test]
    fn truncates_to_final_k() {
        let fused = reciprocal_rank_fusion(&[ids(&["a", "b", "c", "d"])], 2, RRF_K);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn fusion_is_deterministic() {
        let lists = [ids(&["a", "b", "c"]), ids(&["c", "a"])];
        assert_eq!(
            reciprocal_rank_fusion(&lists, 10, RRF_K),
            reciprocal_rank_fusion(&lists, 10, RRF_K)
        );
    }
}
