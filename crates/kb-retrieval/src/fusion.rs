//! Reciprocal Rank Fusion (§4.6), `score(chunk) = Σ 1/(k + rank)` with k=60,
//! matching the original's `application/rag/fusion/rrf.py` constant exactly.

use kb_index::ScoredHit;
use std::collections::HashMap;

pub const RRF_K: f32 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: String,
    pub score: f32,
}

/// Sorts a single backend's hits by score descending, tie-break chunk_id
/// ascending (§4.6 "vector or bm25 alone").
pub fn sort_single_backend(hits: &[ScoredHit]) -> Vec<FusedHit> {
    let mut out: Vec<FusedHit> = hits.iter().map(|h| FusedHit { chunk_id: h.chunk_id.clone(), score: h.score }).collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    out
}

/// Fuses an arbitrary number of ranked lists via RRF. Invariant under
/// permutations of the input lists (but not their internal order) — §8 #4.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredHit>], k: f32) -> Vec<FusedHit> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
        }
    }
    let mut fused: Vec<FusedHit> = scores.into_iter().map(|(chunk_id, score)| FusedHit { chunk_id, score }).collect();
    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f32) -> ScoredHit {
        ScoredHit { chunk_id: id.to_string(), score }
    }

    #[test]
    fn single_backend_sorts_by_score_desc() {
        let hits = vec![hit("c1", 0.5), hit("c2", 0.9)];
        let sorted = sort_single_backend(&hits);
        assert_eq!(sorted[0].chunk_id, "c2");
    }

    #[test]
    fn matches_worked_example_s3() {
        let dense = vec![hit("c1", 0.9), hit("c2", 0.8)];
        let sparse = vec![hit("c2", 4.0), hit("c3", 3.0)];
        let fused = reciprocal_rank_fusion(&[dense, sparse], RRF_K);
        let order: Vec<&str> = fused.iter().map(|f| f.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["c2", "c1", "c3"]);
    }

    #[test]
    fn fusion_is_invariant_under_list_permutation() {
        let dense = vec![hit("c1", 0.9), hit("c2", 0.8)];
        let sparse = vec![hit("c2", 4.0), hit("c3", 3.0)];
        let a = reciprocal_rank_fusion(&[dense.clone(), sparse.clone()], RRF_K);
        let b = reciprocal_rank_fusion(&[sparse, dense], RRF_K);
        assert_eq!(a, b);
    }
}
