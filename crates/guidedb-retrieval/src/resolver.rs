//! Threshold resolution and the versioned configuration store.
//!
//! Operators tune one `master_threshold` per assistant; every other
//! threshold is a fixed ratio of it. Resolved configs live in an immutable
//! `ConfigSnapshot` that `ThresholdStore` swaps atomically on reload, so a
//! request keeps the snapshot it started with.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use guidedb_core::types::Corpus;
use guidedb_core::{Error, Result};

use crate::combiner::WeightPair;
use crate::settings::{AssistantSettings, EngineSettings, RetrievalSettings, WeightSettings};

pub const DOCUMENT_THRESHOLD_RATIO: f64 = 0.85;
pub const KEYWORD_THRESHOLD_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdConfig {
    pub assistant_type: String,
    pub master_threshold: f64,
    pub stage1_threshold: f64,
    pub stage2_threshold: f64,
    pub document_threshold: f64,
    pub keyword_threshold: f64,
    pub stage1_weights: WeightPair,
    pub stage2_weights: WeightPair,
}

impl ThresholdConfig {
    /// Same assistant and weights, thresholds re-derived from `master_threshold`.
    pub fn with_master(&self, master_threshold: f64) -> Result<Self> {
        resolve_with_weights(&self.assistant_type, master_threshold, self.stage1_weights, self.stage2_weights)
    }
}

/// Derive thresholds from `master_threshold` with the default stage weights.
pub fn resolve(assistant_type: &str, master_threshold: f64) -> Result<ThresholdConfig> {
    resolve_with_weights(assistant_type, master_threshold, WeightPair::TITLE_HEAVY, WeightPair::CONTENT_HEAVY)
}

pub fn resolve_with_weights(
    assistant_type: &str,
    master_threshold: f64,
    stage1_weights: WeightPair,
    stage2_weights: WeightPair,
) -> Result<ThresholdConfig> {
    if !(master_threshold > 0.0 && master_threshold <= 1.0) {
        return Err(Error::InvalidConfiguration(format!(
            "{assistant_type}: master_threshold {master_threshold} is outside (0, 1]"
        )));
    }
    if !stage1_weights.is_title_heavy() {
        return Err(Error::InvalidConfiguration(format!("{assistant_type}: stage 1 weights must favour the title")));
    }
    if !stage2_weights.is_content_heavy() {
        return Err(Error::InvalidConfiguration(format!("{assistant_type}: stage 2 weights must favour the content")));
    }
    Ok(ThresholdConfig {
        assistant_type: assistant_type.to_string(),
        master_threshold,
        stage1_threshold: master_threshold,
        stage2_threshold: master_threshold,
        document_threshold: master_threshold * DOCUMENT_THRESHOLD_RATIO,
        keyword_threshold: master_threshold * KEYWORD_THRESHOLD_RATIO,
        stage1_weights,
        stage2_weights,
    })
}

/// A resolved assistant: which corpus it searches and with what thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantProfile {
    pub corpus: Corpus,
    pub thresholds: ThresholdConfig,
}

impl AssistantProfile {
    fn from_settings(assistant_type: &str, settings: &AssistantSettings) -> Result<Self> {
        let stage1 = weights_or(settings.stage1_weights, WeightPair::TITLE_HEAVY)?;
        let stage2 = weights_or(settings.stage2_weights, WeightPair::CONTENT_HEAVY)?;
        let thresholds = resolve_with_weights(assistant_type, settings.master_threshold, stage1, stage2)?;
        Ok(Self { corpus: settings.corpus, thresholds })
    }
}

fn weights_or(configured: Option<WeightSettings>, default: WeightPair) -> Result<WeightPair> {
    match configured {
        Some(w) => WeightPair::new(w.title, w.content),
        None => Ok(default),
    }
}

/// Immutable, fully validated configuration at one version.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub retrieval: RetrievalSettings,
    assistants: BTreeMap<String, AssistantProfile>,
}

impl ConfigSnapshot {
    pub fn build(version: u64, settings: &EngineSettings) -> Result<Self> {
        let retrieval = settings.retrieval.clone();
        if retrieval.candidate_pool == 0 {
            return Err(Error::InvalidConfiguration("retrieval.candidate_pool must be positive".into()));
        }
        if !(retrieval.rrf_k.is_finite() && retrieval.rrf_k > 0.0) {
            return Err(Error::InvalidConfiguration(format!("retrieval.rrf_k {} must be positive", retrieval.rrf_k)));
        }
        let mut assistants = BTreeMap::new();
        for (name, assistant) in &settings.assistants {
            assistants.insert(name.clone(), AssistantProfile::from_settings(name, assistant)?);
        }
        Ok(Self { version, retrieval, assistants })
    }

    /// No silent default: an unknown assistant is a configuration error.
    pub fn assistant(&self, assistant_type: &str) -> Result<&AssistantProfile> {
        self.assistants
            .get(assistant_type)
            .ok_or_else(|| Error::InvalidConfiguration(format!("no active configuration for assistant '{assistant_type}'")))
    }

    pub fn resolve(&self, assistant_type: &str) -> Result<ThresholdConfig> {
        self.assistant(assistant_type).map(|p| p.thresholds.clone())
    }

    pub fn assistant_types(&self) -> impl Iterator<Item = &str> {
        self.assistants.keys().map(String::as_str)
    }
}

/// Holds the current `ConfigSnapshot` behind an atomic pointer.
///
/// Readers never block. Reloads are serialized so that the active version
/// only ever increases.
pub struct ThresholdStore {
    current: ArcSwap<ConfigSnapshot>,
    /// Next version to hand out; held for the whole reload.
    next_version: Mutex<u64>,
}

impl ThresholdStore {
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let snapshot = ConfigSnapshot::build(1, settings)?;
        info!(version = 1, assistants = snapshot.assistants.len(), "threshold configuration loaded");
        Ok(Self { current: ArcSwap::from_pointee(snapshot), next_version: Mutex::new(2) })
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> { self.current.load_full() }

    pub fn version(&self) -> u64 { self.current.load().version }

    pub fn resolve(&self, assistant_type: &str) -> Result<ThresholdConfig> {
        self.current.load().resolve(assistant_type)
    }

    /// Validate `settings` and make them current. On error the previous
    /// snapshot stays active.
    pub fn reload(&self, settings: &EngineSettings) -> Result<u64> {
        let mut next_version = self.next_version.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let version = *next_version;
        *next_version += 1;
        match ConfigSnapshot::build(version, settings) {
            Ok(snapshot) => {
                self.current.store(Arc::new(snapshot));
                info!(version, "threshold configuration swapped");
                Ok(version)
            }
            Err(e) => {
                warn!(error = %e, active = self.version(), "rejected configuration reload");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_assistant_ratios() {
        let cfg = resolve("protocol_assistant", 0.75).unwrap();
        assert_eq!(cfg.stage1_threshold, 0.75);
        assert_eq!(cfg.stage2_threshold, 0.75);
        assert!((cfg.document_threshold - 0.6375).abs() < 1e-12);
        assert!((cfg.keyword_threshold - 0.375).abs() < 1e-12);
    }

    #[test]
    fn master_must_lie_in_half_open_unit_interval() {
        assert!(resolve("a", 1.0).is_ok());
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            assert!(matches!(resolve("a", bad), Err(Error::InvalidConfiguration(_))), "{bad}");
        }
    }

    #[test]
    fn inverted_stage_weights_are_rejected() {
        let r = resolve_with_weights("a", 0.5, WeightPair::CONTENT_HEAVY, WeightPair::CONTENT_HEAVY);
        assert!(matches!(r, Err(Error::InvalidConfiguration(_))));
    }
}
