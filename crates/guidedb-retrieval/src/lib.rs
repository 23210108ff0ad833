//! guidedb-retrieval
//!
//! Weighted multi-vector retrieval: title/content score fusion, threshold
//! filtering with floor protection, reciprocal rank fusion with keyword
//! search, per-assistant threshold resolution and the two-stage escalation
//! controller behind `RetrievalEngine`.

pub mod combiner;
pub mod controller;
pub mod engine;
pub mod filter;
pub mod resolver;
pub mod rrf;
pub mod settings;

pub use combiner::{combine, WeightPair};
pub use controller::{is_sufficient, Escalation, EscalationController, StagePlan};
pub use engine::{looks_lexical, snippet, KeywordMode, RetrievalEngine, RetrievalHit, RetrievalRequest, RetrievalResponse};
pub use filter::{filter_with_floor, ScoredMatch, SearchResultSet};
pub use resolver::{resolve, ConfigSnapshot, ThresholdConfig, ThresholdStore};
pub use rrf::fuse;
pub use settings::{AssistantSettings, EngineSettings, RetrievalSettings, WeightSettings};
