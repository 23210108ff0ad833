//! `[retrieval]` and `[assistants.*]` configuration sections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use guidedb_core::config::Config;
use guidedb_core::types::Corpus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Top-N asked of the vector store per stage.
    pub candidate_pool: usize,
    /// Stage 1 is sufficient with at least this many matches at or above threshold.
    pub min_sufficient_matches: usize,
    pub rrf_k: f64,
    pub embed_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            candidate_pool: 50,
            min_sufficient_matches: 2,
            rrf_k: 60.0,
            embed_timeout_ms: 5000,
            store_timeout_ms: 5000,
            snippet_chars: 300,
        }
    }
}

impl RetrievalSettings {
    pub fn embed_timeout(&self) -> Duration { Duration::from_millis(self.embed_timeout_ms) }

    pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightSettings {
    pub title: f64,
    pub content: f64,
}

/// One `[assistants.<type>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantSettings {
    pub master_threshold: f64,
    pub corpus: Corpus,
    #[serde(default)]
    pub stage1_weights: Option<WeightSettings>,
    #[serde(default)]
    pub stage2_weights: Option<WeightSettings>,
}

impl AssistantSettings {
    pub fn new(master_threshold: f64, corpus: Corpus) -> Self {
        Self { master_threshold, corpus, stage1_weights: None, stage2_weights: None }
    }
}

/// Everything the engine reads from configuration. Validation happens when a
/// `ThresholdStore` turns it into a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub assistants: BTreeMap<String, AssistantSettings>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            retrieval: config.get_opt("retrieval")?.unwrap_or_default(),
            assistants: config.get_opt("assistants")?.unwrap_or_default(),
        })
    }

    pub fn with_assistant(mut self, assistant_type: &str, settings: AssistantSettings) -> Self {
        self.assistants.insert(assistant_type.to_string(), settings);
        self
    }
}
