//! Reciprocal Rank Fusion: score = Σ 1/(k + rank), rank 1-based.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use guidedb_core::types::ItemId;

/// Fuse a vector ranking and a keyword ranking.
///
/// An id repeated within one ranking counts once, at its first position.
/// Output is sorted by fused score descending; equal scores keep vector-ranking
/// order, and keyword-only items follow in keyword order.
pub fn fuse(vector_ranking: &[ItemId], keyword_ranking: &[ItemId], k: f64) -> Vec<(ItemId, f64)> {
    let mut order: Vec<ItemId> = Vec::with_capacity(vector_ranking.len() + keyword_ranking.len());
    let mut scores: HashMap<&str, f64> = HashMap::new();

    for ranking in [vector_ranking, keyword_ranking] {
        let mut rank = 0usize;
        let mut seen_here = HashSet::new();
        for id in ranking {
            if !seen_here.insert(id.as_str()) { continue; }
            rank += 1;
            let contribution = 1.0 / (k + rank as f64);
            match scores.get_mut(id.as_str()) {
                Some(score) => *score += contribution,
                None => {
                    scores.insert(id.as_str(), contribution);
                    order.push(id.clone());
                }
            }
        }
    }

    let mut fused: Vec<(ItemId, f64)> = order
        .into_iter()
        .map(|id| {
            let score = scores.get(id.as_str()).copied().unwrap_or(0.0);
            (id, score)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    fused
}
