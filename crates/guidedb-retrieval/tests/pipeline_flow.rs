use std::sync::Arc;

use guidedb_core::processor::GuideProcessor;
use guidedb_core::traits::VectorWriter;
use guidedb_core::types::{Corpus, StageTag};
use guidedb_embed::HashEmbedder;
use guidedb_retrieval::{AssistantSettings, EngineSettings, KeywordMode, RetrievalEngine, RetrievalRequest, ThresholdStore};
use guidedb_text::KeywordIndex;
use guidedb_vector::{refresh_vectors, MemoryCorpusStore, RefreshOptions};

const AUTOCLAVE: &str = "# Autoclave Protocol\n\nSterilize glassware and media.\n\n## Loading\n\nLeave space between items so steam circulates.\n\n## Cycle selection\n\nUse the liquid cycle for media bottles.\n";
const CENTRIFUGE: &str = "# Centrifuge Errors\n\nFault reference.\n\n## Imbalance\n\nError E-1042 means the rotor is out of balance.\n";
const ISSUE: &str = "# Rotor fault\n\nE-1042 reported twice on unit 7.\n";

#[tokio::test]
async fn ingest_refresh_and_query() -> anyhow::Result<()> {
    let tmp = tempfile::TempDir::new()?;
    std::fs::write(tmp.path().join("autoclave.md"), AUTOCLAVE)?;
    std::fs::write(tmp.path().join("centrifuge.md"), CENTRIFUGE)?;
    std::fs::create_dir(tmp.path().join("issues"))?;
    std::fs::write(tmp.path().join("issues/rotor.md"), ISSUE)?;

    let items = GuideProcessor::new().process_directory(tmp.path())?;
    let store = Arc::new(MemoryCorpusStore::new());
    store.upsert_items(&items).await?;
    let keywords = Arc::new(KeywordIndex::create_in_ram()?);
    keywords.index_items(&items)?;

    let embedder = Arc::new(HashEmbedder::new(1024));
    let report = refresh_vectors(store.as_ref(), embedder.as_ref(), &RefreshOptions::default()).await?;
    assert_eq!(report.embedded, items.len());

    let mut settings = EngineSettings::default()
        .with_assistant("protocol_assistant", AssistantSettings::new(0.5, Corpus::ProtocolGuide))
        .with_assistant("rvt_assistant", AssistantSettings::new(0.5, Corpus::IssueReport));
    settings.retrieval.min_sufficient_matches = 1;
    let config = Arc::new(ThresholdStore::new(&settings)?);
    let engine = RetrievalEngine::new(embedder, store.clone(), store.clone(), config).with_keyword_searcher(keywords);

    // Query text equal to a heading: title similarity is 1, so Stage 1 suffices.
    let response = engine.retrieve(&RetrievalRequest::new("Cycle selection", "protocol_assistant", 3)).await?;
    assert_eq!(response.stage, StageTag::Stage1);
    assert!(!response.degraded);
    assert_eq!(response.hits[0].id, "protocol_guide:autoclave.md#3");
    assert_eq!(response.hits[0].title, "Cycle selection");
    assert!(response.hits[0].score > 0.9);

    // Issue reports live in their own partitions.
    let response = engine
        .retrieve(&RetrievalRequest::new("E-1042", "rvt_assistant", 3).with_keyword_mode(KeywordMode::Always))
        .await?;
    assert!(response.hits.iter().all(|h| h.id.starts_with("issue_report:")));
    assert!(response.hits.iter().any(|h| h.rrf_score.is_some()));

    let listing = engine.search_documents("Autoclave Protocol", "protocol_assistant", 1).await?;
    assert_eq!(listing.hits.len(), 1);
    assert_eq!(listing.hits[0].id, "protocol_guide:autoclave.md");
    Ok(())
}
