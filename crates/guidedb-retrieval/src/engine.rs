//! Request/response surface of the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{error, info_span, warn, Instrument};

use guidedb_core::traits::{CorpusRepository, EmbeddingProvider, KeywordSearcher, VectorStore};
use guidedb_core::types::{ItemId, ItemMetadata, StageTag};
use guidedb_core::{Error, Result};

use crate::controller::{EscalationController, StagePlan};
use crate::filter::SearchResultSet;
use crate::resolver::{ConfigSnapshot, ThresholdStore};
use crate::settings::RetrievalSettings;

/// Whether a request also runs keyword search and fuses it with RRF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
    /// Only when the query looks lexical (codes, error strings, quoted phrases).
    #[default]
    Auto,
    Always,
    Never,
}

impl KeywordMode {
    pub fn wants_keywords(self, query: &str) -> bool {
        match self {
            KeywordMode::Auto => looks_lexical(query),
            KeywordMode::Always => true,
            KeywordMode::Never => false,
        }
    }
}

/// True for queries with a quoted phrase, a letter+digit token (`X200`,
/// `E-1042`), an upper-case code with `_` or `-` (`ERR_TIMEOUT`) or a hex
/// literal (`0x1F`).
pub fn looks_lexical(query: &str) -> bool {
    if query.matches('"').count() >= 2 { return true; }
    query
        .split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-')))
        .any(is_code_token)
}

fn is_code_token(token: &str) -> bool {
    let letters = token.chars().filter(|c| c.is_alphabetic()).count();
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if letters > 0 && has_digit { return true; }
    let hex = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"));
    if hex.is_some_and(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_hexdigit())) { return true; }
    letters >= 2
        && (token.contains('_') || token.contains('-'))
        && token.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
}

/// First `max_chars` characters, with `…` when cut.
pub fn snippet(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", content[..cut].trim_end()),
        None => content.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub assistant_type: String,
    pub top_k: usize,
    /// Per-request master threshold; never written back to configuration.
    #[serde(default)]
    pub score_threshold: Option<f64>,
    #[serde(default)]
    pub keyword_mode: KeywordMode,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, assistant_type: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            assistant_type: assistant_type.into(),
            top_k,
            score_threshold: None,
            keyword_mode: KeywordMode::Auto,
        }
    }

    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_keyword_mode(mut self, mode: KeywordMode) -> Self {
        self.keyword_mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub id: ItemId,
    pub title: String,
    pub content_snippet: String,
    /// Combined title/content score.
    pub score: f64,
    pub stage: StageTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResponse {
    pub hits: Vec<RetrievalHit>,
    pub stage: StageTag,
    pub degraded: bool,
    pub config_version: u64,
}

impl RetrievalResponse {
    fn empty(stage: StageTag, config_version: u64) -> Self {
        Self { hits: Vec::new(), stage, degraded: false, config_version }
    }

    fn degraded(stage: StageTag, config_version: u64) -> Self {
        Self { degraded: true, ..Self::empty(stage, config_version) }
    }
}

pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    repository: Arc<dyn CorpusRepository>,
    keywords: Option<Arc<dyn KeywordSearcher>>,
    config: Arc<ThresholdStore>,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        repository: Arc<dyn CorpusRepository>,
        config: Arc<ThresholdStore>,
    ) -> Self {
        Self { embedder, store, repository, keywords: None, config }
    }

    pub fn with_keyword_searcher(mut self, keywords: Arc<dyn KeywordSearcher>) -> Self {
        self.keywords = Some(keywords);
        self
    }

    pub fn config(&self) -> &Arc<ThresholdStore> { &self.config }

    /// Ranked, thresholded matches for one query.
    ///
    /// Configuration errors and `DimensionMismatch` are returned as errors.
    /// Embedding and store failures yield an empty response flagged `degraded`.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let span = info_span!("retrieve", assistant = %request.assistant_type, top_k = request.top_k);
        self.retrieve_inner(request).instrument(span).await
    }

    async fn retrieve_inner(&self, request: &RetrievalRequest) -> Result<RetrievalResponse> {
        let snapshot = self.config.snapshot();
        let profile = snapshot.assistant(&request.assistant_type)?;
        let thresholds = match request.score_threshold {
            Some(master) => profile.thresholds.with_master(master)?,
            None => profile.thresholds.clone(),
        };
        if request.top_k == 0 || request.query.trim().is_empty() {
            return Ok(RetrievalResponse::empty(StageTag::Stage1, snapshot.version));
        }
        let settings = &snapshot.retrieval;
        let Some(query_vector) = self.embed_query(&request.query, settings).await? else {
            return Ok(RetrievalResponse::degraded(StageTag::Stage1, snapshot.version));
        };

        let hybrid = request.keyword_mode.wants_keywords(&request.query);
        let controller = EscalationController::new(self.store.as_ref(), self.repository.as_ref(), settings, &request.assistant_type)
            .with_keywords(self.keywords.clone().filter(|_| hybrid));
        let escalation = controller
            .run(&request.query, &query_vector, &thresholds, profile.corpus, request.top_k)
            .await?;
        let stage = escalation.result.stage();
        if escalation.degraded {
            return Ok(RetrievalResponse::degraded(stage, snapshot.version));
        }
        self.respond(escalation.result, request.top_k, &snapshot).await
    }

    /// Single whole-document pass against `document_threshold`, for listing
    /// the guides relevant to a query.
    pub async fn search_documents(&self, query: &str, assistant_type: &str, top_k: usize) -> Result<RetrievalResponse> {
        let span = info_span!("search_documents", assistant = %assistant_type, top_k);
        self.search_documents_inner(query, assistant_type, top_k).instrument(span).await
    }

    async fn search_documents_inner(&self, query: &str, assistant_type: &str, top_k: usize) -> Result<RetrievalResponse> {
        let snapshot = self.config.snapshot();
        let profile = snapshot.assistant(assistant_type)?;
        if top_k == 0 || query.trim().is_empty() {
            return Ok(RetrievalResponse::empty(StageTag::Stage2, snapshot.version));
        }
        let settings = &snapshot.retrieval;
        let Some(query_vector) = self.embed_query(query, settings).await? else {
            return Ok(RetrievalResponse::degraded(StageTag::Stage2, snapshot.version));
        };
        let plan = StagePlan::documents(profile.corpus, &profile.thresholds, top_k);
        let controller = EscalationController::new(self.store.as_ref(), self.repository.as_ref(), settings, assistant_type);
        let outcome = controller.run_stage(&plan, query, &query_vector).await?;
        if outcome.failed {
            return Ok(RetrievalResponse::degraded(StageTag::Stage2, snapshot.version));
        }
        self.respond(outcome.result, top_k, &snapshot).await
    }

    /// `None` when the provider failed or timed out.
    async fn embed_query(&self, query: &str, settings: &RetrievalSettings) -> Result<Option<Vec<f32>>> {
        let dim = self.embedder.dim();
        match timeout(settings.embed_timeout(), self.embedder.embed(query)).await {
            Ok(Ok(v)) if v.len() == dim => Ok(Some(v)),
            Ok(Ok(v)) => {
                let e = Error::DimensionMismatch { expected: dim, actual: v.len() };
                error!(error = %e, model = self.embedder.model_id(), "query embedding has wrong length");
                Err(e)
            }
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "query embedding failed, returning degraded result");
                Ok(None)
            }
            Ok(Err(e)) => {
                error!(error = %e, "query embedding aborted");
                Err(e)
            }
            Err(_) => {
                warn!(timeout_ms = settings.embed_timeout_ms, "query embedding timed out, returning degraded result");
                Ok(None)
            }
        }
    }

    /// Attach titles and snippets. Matches whose metadata is gone are dropped.
    async fn respond(&self, mut result: SearchResultSet, top_k: usize, snapshot: &ConfigSnapshot) -> Result<RetrievalResponse> {
        result.truncate(top_k);
        let stage = result.stage();
        if result.is_empty() {
            return Ok(RetrievalResponse::empty(stage, snapshot.version));
        }
        let settings = &snapshot.retrieval;
        let ids = result.ids();
        let metadata = match timeout(settings.store_timeout(), self.repository.fetch_item_metadata(&ids)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "metadata fetch failed, returning degraded result");
                return Ok(RetrievalResponse::degraded(stage, snapshot.version));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(timeout_ms = settings.store_timeout_ms, "metadata fetch timed out, returning degraded result");
                return Ok(RetrievalResponse::degraded(stage, snapshot.version));
            }
        };
        let mut by_id: HashMap<ItemId, ItemMetadata> = metadata.into_iter().map(|m| (m.id.clone(), m)).collect();
        let hits = result
            .into_matches()
            .into_iter()
            .filter_map(|m| {
                let meta = by_id.remove(&m.id)?;
                Some(RetrievalHit {
                    content_snippet: snippet(&meta.content, settings.snippet_chars),
                    title: meta.title,
                    id: m.id,
                    score: m.combined_score,
                    stage: m.stage,
                    rrf_score: m.rrf_score,
                })
            })
            .collect();
        Ok(RetrievalResponse { hits, stage, degraded: false, config_version: snapshot.version })
    }
}
