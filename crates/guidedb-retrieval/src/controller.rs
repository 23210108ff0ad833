//! Two-stage escalation: sections with title-heavy weights first, whole
//! documents with content-heavy weights only when Stage 1 is insufficient.
//!
//! Stages run strictly in sequence. A vector-store failure or timeout makes a
//! stage yield zero candidates; `DimensionMismatch` and other fatal errors
//! abort the request.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

use guidedb_core::similarity::cosine;
use guidedb_core::traits::{CorpusRepository, KeywordSearcher, VectorStore};
use guidedb_core::types::{Corpus, ItemId, KeywordHit, Partition, StageTag, VectorHit};
use guidedb_core::Result;

use crate::combiner::WeightPair;
use crate::filter::{filter_with_floor, ScoredMatch, SearchResultSet};
use crate::resolver::ThresholdConfig;
use crate::rrf::fuse;
use crate::settings::RetrievalSettings;

/// What one pass searches and how it filters.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub stage: StageTag,
    pub partition: Partition,
    pub weights: WeightPair,
    pub threshold: f64,
    pub keyword_threshold: f64,
    pub min_results: usize,
}

impl StagePlan {
    pub fn stage1(corpus: Corpus, cfg: &ThresholdConfig, min_results: usize) -> Self {
        Self {
            stage: StageTag::Stage1,
            partition: Partition::sections(corpus),
            weights: cfg.stage1_weights,
            threshold: cfg.stage1_threshold,
            keyword_threshold: cfg.keyword_threshold,
            min_results,
        }
    }

    pub fn stage2(corpus: Corpus, cfg: &ThresholdConfig, min_results: usize) -> Self {
        Self {
            stage: StageTag::Stage2,
            partition: Partition::documents(corpus),
            weights: cfg.stage2_weights,
            threshold: cfg.stage2_threshold,
            keyword_threshold: cfg.keyword_threshold,
            min_results,
        }
    }

    /// Whole-document listing: Stage 2 weights against `document_threshold`.
    pub fn documents(corpus: Corpus, cfg: &ThresholdConfig, min_results: usize) -> Self {
        Self { threshold: cfg.document_threshold, ..Self::stage2(corpus, cfg, min_results) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub result: SearchResultSet,
    /// The vector store failed or timed out; `result` is empty.
    pub failed: bool,
}

impl StageOutcome {
    fn failed(stage: StageTag) -> Self { Self { result: SearchResultSet::empty(stage), failed: true } }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub result: SearchResultSet,
    pub escalated: bool,
    /// Stage 2 failed; the result is empty for that reason, not for lack of matches.
    pub degraded: bool,
}

/// Stage 1 is enough when `min_sufficient` matches clear the threshold and the
/// best match does too.
pub fn is_sufficient(result: &SearchResultSet, threshold: f64, min_sufficient: usize) -> bool {
    result.count_at_or_above(threshold) >= min_sufficient
        && result.best_combined_score().is_some_and(|best| best >= threshold)
}

pub struct EscalationController<'a> {
    store: &'a dyn VectorStore,
    repository: &'a dyn CorpusRepository,
    /// Set only for hybrid requests.
    keywords: Option<Arc<dyn KeywordSearcher>>,
    settings: &'a RetrievalSettings,
    assistant: &'a str,
}

impl<'a> EscalationController<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        repository: &'a dyn CorpusRepository,
        settings: &'a RetrievalSettings,
        assistant: &'a str,
    ) -> Self {
        Self { store, repository, keywords: None, settings, assistant }
    }

    pub fn with_keywords(mut self, keywords: Option<Arc<dyn KeywordSearcher>>) -> Self {
        self.keywords = keywords;
        self
    }

    pub async fn run(
        &self,
        query_text: &str,
        query_vector: &[f32],
        thresholds: &ThresholdConfig,
        corpus: Corpus,
        min_results: usize,
    ) -> Result<Escalation> {
        let plan1 = StagePlan::stage1(corpus, thresholds, min_results);
        let first = self.run_stage(&plan1, query_text, query_vector).await?;
        if !first.failed && is_sufficient(&first.result, plan1.threshold, self.settings.min_sufficient_matches) {
            debug!(assistant = self.assistant, matches = first.result.len(), "stage 1 sufficient");
            return Ok(Escalation { result: first.result, escalated: false, degraded: false });
        }

        info!(
            assistant = self.assistant,
            stage1_failed = first.failed,
            above = first.result.count_at_or_above(plan1.threshold),
            required = self.settings.min_sufficient_matches,
            "escalating to stage 2"
        );
        let plan2 = StagePlan::stage2(corpus, thresholds, min_results);
        let second = self.run_stage(&plan2, query_text, query_vector).await?;
        Ok(Escalation { degraded: second.failed, result: second.result, escalated: true })
    }

    pub async fn run_stage(&self, plan: &StagePlan, query_text: &str, query_vector: &[f32]) -> Result<StageOutcome> {
        let span = info_span!(
            "stage",
            assistant = self.assistant,
            stage = plan.stage.as_str(),
            partition = plan.partition.as_str()
        );
        self.run_stage_inner(plan, query_text, query_vector).instrument(span).await
    }

    async fn run_stage_inner(&self, plan: &StagePlan, query_text: &str, query_vector: &[f32]) -> Result<StageOutcome> {
        let Some(hits) = self.vector_candidates(plan, query_vector).await? else {
            return Ok(StageOutcome::failed(plan.stage));
        };
        let pool = hits.len();
        let scored: Vec<ScoredMatch> = hits.into_iter().filter_map(|hit| score_hit(hit, plan)).collect();
        let candidates = SearchResultSet::from_scored(plan.stage, scored);
        let filtered = filter_with_floor(candidates, plan.threshold, plan.min_results);
        debug!(pool, kept = filtered.len(), threshold = plan.threshold, min_results = plan.min_results, "vector candidates filtered");

        let result = match &self.keywords {
            Some(keywords) => self.fuse_with_keywords(plan, keywords, query_text, query_vector, filtered).await?,
            None => filtered,
        };
        Ok(StageOutcome { result, failed: false })
    }

    /// `None` when the store failed or timed out.
    async fn vector_candidates(&self, plan: &StagePlan, query_vector: &[f32]) -> Result<Option<Vec<VectorHit>>> {
        let search = self.store.search(query_vector, plan.partition, self.settings.candidate_pool);
        match timeout(self.settings.store_timeout(), search).await {
            Ok(Ok(hits)) => Ok(Some(hits)),
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "vector search failed, stage has no candidates");
                Ok(None)
            }
            Ok(Err(e)) => {
                error!(error = %e, "vector search aborted");
                Err(e)
            }
            Err(_) => {
                warn!(timeout_ms = self.settings.store_timeout_ms, "vector search timed out, stage has no candidates");
                Ok(None)
            }
        }
    }

    /// Fuse the filtered vector ranking with keyword hits that clear
    /// `keyword_threshold`. Thresholds are applied before fusion, each in its
    /// own score space; the fused order is returned as is.
    async fn fuse_with_keywords(
        &self,
        plan: &StagePlan,
        keywords: &Arc<dyn KeywordSearcher>,
        query_text: &str,
        query_vector: &[f32],
        filtered: SearchResultSet,
    ) -> Result<SearchResultSet> {
        let keyword_hits = self.keyword_candidates(plan, keywords, query_text).await;
        let keyword_ranking: Vec<ItemId> = keyword_hits
            .into_iter()
            .filter(|h| h.score >= plan.keyword_threshold)
            .map(|h| h.id)
            .collect();
        let fused = fuse(&filtered.ids(), &keyword_ranking, self.settings.rrf_k);

        let mut by_id: HashMap<ItemId, ScoredMatch> =
            filtered.into_matches().into_iter().map(|m| (m.id.clone(), m)).collect();
        let keyword_only: Vec<ItemId> = fused.iter().filter(|(id, _)| !by_id.contains_key(id)).map(|(id, _)| id.clone()).collect();
        for m in self.score_keyword_only(plan, query_vector, &keyword_only).await? {
            by_id.insert(m.id.clone(), m);
        }

        let ranked: Vec<ScoredMatch> = fused
            .into_iter()
            .filter_map(|(id, rrf)| {
                by_id.remove(&id).map(|mut m| {
                    m.rrf_score = Some(rrf);
                    m
                })
            })
            .collect();
        debug!(keyword = keyword_ranking.len(), keyword_only = keyword_only.len(), fused = ranked.len(), "hybrid ranking fused");
        Ok(SearchResultSet::from_ranked(plan.stage, ranked))
    }

    /// Lexical search on the blocking pool, bounded by the store timeout. Any
    /// failure leaves the stage with its vector ranking alone.
    async fn keyword_candidates(&self, plan: &StagePlan, keywords: &Arc<dyn KeywordSearcher>, query_text: &str) -> Vec<KeywordHit> {
        let searcher = Arc::clone(keywords);
        let query = query_text.to_string();
        let (partition, limit) = (plan.partition, self.settings.candidate_pool);
        let task = spawn_blocking(move || searcher.search_keywords(&query, partition, limit));
        match timeout(self.settings.store_timeout(), task).await {
            Ok(Ok(Ok(hits))) => hits,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "keyword search failed, using vector ranking only");
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "keyword search task aborted, using vector ranking only");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_ms = self.settings.store_timeout_ms, "keyword search timed out, using vector ranking only");
                Vec::new()
            }
        }
    }

    /// Score keyword-only items from their stored vectors. Items lacking either
    /// vector are dropped; a repository failure drops all of them.
    async fn score_keyword_only(&self, plan: &StagePlan, query_vector: &[f32], ids: &[ItemId]) -> Result<Vec<ScoredMatch>> {
        if ids.is_empty() { return Ok(Vec::new()); }
        let fetch = self.repository.fetch_vectors_by_partition(plan.partition, ids);
        let vectors = match timeout(self.settings.store_timeout(), fetch).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "could not fetch vectors for keyword-only items");
                return Ok(Vec::new());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(timeout_ms = self.settings.store_timeout_ms, "vector fetch timed out for keyword-only items");
                return Ok(Vec::new());
            }
        };
        let mut out = Vec::with_capacity(vectors.len());
        for item in vectors {
            let (Some(title), Some(content)) = (item.title_vector.as_deref(), item.content_vector.as_deref()) else { continue };
            let t = cosine(query_vector, title).inspect_err(|e| error!(error = %e, id = %item.id, "stored vector skew"))?;
            let c = cosine(query_vector, content).inspect_err(|e| error!(error = %e, id = %item.id, "stored vector skew"))?;
            out.push(ScoredMatch::new(item.id, plan.partition, f64::from(t), f64::from(c), plan.weights, plan.stage));
        }
        Ok(out)
    }
}

/// Items missing either vector are skipped, never scored as zero.
fn score_hit(hit: VectorHit, plan: &StagePlan) -> Option<ScoredMatch> {
    let (title, content) = (hit.title_sim?, hit.content_sim?);
    Some(ScoredMatch::new(hit.id, plan.partition, f64::from(title), f64::from(content), plan.weights, plan.stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;

    #[test]
    fn documents_plan_uses_document_threshold() {
        let cfg = resolve("protocol_assistant", 0.8).unwrap();
        let plan = StagePlan::documents(Corpus::ProtocolGuide, &cfg, 3);
        assert_eq!(plan.stage, StageTag::Stage2);
        assert_eq!(plan.partition, Partition::documents(Corpus::ProtocolGuide));
        assert!((plan.threshold - 0.68).abs() < 1e-12);
        assert_eq!(plan.weights, cfg.stage2_weights);
    }

    #[test]
    fn stage1_title_heavy_scenario() {
        let cfg = resolve("protocol_assistant", 0.75).unwrap();
        let plan = StagePlan::stage1(Corpus::ProtocolGuide, &cfg, 1);
        let hit = VectorHit { id: "s".into(), title_sim: Some(0.80), content_sim: Some(0.10) };
        let m = score_hit(hit, &plan).unwrap();
        let expected = 0.95 * f64::from(0.80f32) + 0.05 * f64::from(0.10f32);
        assert_eq!(m.combined_score, expected);
        assert!((m.combined_score - 0.765).abs() < 1e-6);
    }

    #[test]
    fn hits_missing_a_vector_are_skipped() {
        let cfg = resolve("a", 0.5).unwrap();
        let plan = StagePlan::stage1(Corpus::IssueReport, &cfg, 1);
        assert!(score_hit(VectorHit { id: "x".into(), title_sim: None, content_sim: Some(0.9) }, &plan).is_none());
    }
}
