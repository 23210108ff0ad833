//! Scored matches, result sets and the threshold filter with floor protection.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

use guidedb_core::types::{ItemId, Partition, StageTag};

use crate::combiner::{combine, WeightPair};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    pub id: ItemId,
    pub partition: Partition,
    pub title_score: f64,
    pub content_score: f64,
    /// Always `combine(title_score, content_score, weights)` for the stage's weights.
    pub combined_score: f64,
    pub stage: StageTag,
    /// Fused rank score; set only when the stage ran in hybrid mode.
    pub rrf_score: Option<f64>,
}

impl ScoredMatch {
    pub fn new(id: ItemId, partition: Partition, title_score: f64, content_score: f64, weights: WeightPair, stage: StageTag) -> Self {
        Self {
            id,
            partition,
            title_score,
            content_score,
            combined_score: combine(title_score, content_score, weights),
            stage,
            rrf_score: None,
        }
    }
}

/// Matches of one stage, unique by id.
///
/// `from_scored` orders by `combined_score` descending; `from_ranked` keeps
/// the caller's order (fused rank in hybrid mode).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultSet {
    stage: StageTag,
    matches: Vec<ScoredMatch>,
}

impl SearchResultSet {
    pub fn empty(stage: StageTag) -> Self { Self { stage, matches: Vec::new() } }

    /// Sort by combined score (stable, so equal scores keep input order) and
    /// keep the best-scoring entry per id.
    pub fn from_scored(stage: StageTag, mut matches: Vec<ScoredMatch>) -> Self {
        matches.sort_by(|a, b| by_score_desc(a, b));
        Self { stage, matches: dedup_by_id(matches) }
    }

    pub fn from_ranked(stage: StageTag, matches: Vec<ScoredMatch>) -> Self {
        Self { stage, matches: dedup_by_id(matches) }
    }

    pub fn stage(&self) -> StageTag { self.stage }

    pub fn matches(&self) -> &[ScoredMatch] { &self.matches }

    pub fn into_matches(self) -> Vec<ScoredMatch> { self.matches }

    pub fn len(&self) -> usize { self.matches.len() }

    pub fn is_empty(&self) -> bool { self.matches.is_empty() }

    pub fn ids(&self) -> Vec<ItemId> { self.matches.iter().map(|m| m.id.clone()).collect() }

    /// Matches at or above `threshold` in combined-score space.
    pub fn count_at_or_above(&self, threshold: f64) -> usize {
        self.matches.iter().filter(|m| m.combined_score >= threshold).count()
    }

    pub fn best_combined_score(&self) -> Option<f64> {
        self.matches.iter().map(|m| m.combined_score).max_by(f64::total_cmp)
    }

    pub fn truncate(&mut self, len: usize) { self.matches.truncate(len); }
}

fn by_score_desc(a: &ScoredMatch, b: &ScoredMatch) -> Ordering {
    b.combined_score.partial_cmp(&a.combined_score).unwrap_or(Ordering::Equal)
}

fn dedup_by_id(matches: Vec<ScoredMatch>) -> Vec<ScoredMatch> {
    let mut seen = HashSet::new();
    matches.into_iter().filter(|m| seen.insert(m.id.clone())).collect()
}

/// Keep every match scoring `>= threshold`; if fewer than `min_results`
/// survive, backfill with the best sub-threshold matches until `min_results`
/// is met or the pool runs out. A threshold `<= 0` passes every match.
pub fn filter_with_floor(set: SearchResultSet, threshold: f64, min_results: usize) -> SearchResultSet {
    let stage = set.stage;
    let (mut above, mut below): (Vec<ScoredMatch>, Vec<ScoredMatch>) =
        set.matches.into_iter().partition(|m| threshold <= 0.0 || m.combined_score >= threshold);
    above.sort_by(by_score_desc);
    if above.len() < min_results {
        below.sort_by(by_score_desc);
        let missing = min_results - above.len();
        above.extend(below.into_iter().take(missing));
    }
    SearchResultSet { stage, matches: above }
}
