use async_trait::async_trait;

use guidedb_core::traits::{EmbeddingProvider, VectorStore, VectorWriter};
use guidedb_core::types::{Corpus, CorpusItem, Partition};
use guidedb_core::{Error, Result};
use guidedb_embed::HashEmbedder;
use guidedb_vector::{refresh_vectors, MemoryCorpusStore, RefreshOptions};

fn item(id: &str, title: &str, content: &str) -> CorpusItem {
    CorpusItem {
        id: id.to_string(),
        partition: Partition::sections(Corpus::IssueReport),
        title: title.to_string(),
        content: content.to_string(),
        heading_level: 1,
        parent_document_id: None,
        title_vector: None,
        content_vector: None,
    }
}

struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn model_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 8 }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> { Err(Error::Embed("provider offline".into())) }
}

struct ShortProvider;

#[async_trait]
impl EmbeddingProvider for ShortProvider {
    fn model_id(&self) -> &str { "short" }
    fn dim(&self) -> usize { 8 }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> { Ok(vec![0.1; 4]) }
}

#[tokio::test]
async fn refresh_fills_missing_vectors_and_is_idempotent() {
    let store = MemoryCorpusStore::new();
    store
        .upsert_items(&[
            item("i1", "Centrifuge imbalance", "Rotor wobbles at speed"),
            item("i2", "Freezer alarm", "Temperature above -70"),
            item("i3", "Pipette drift", "Volume reads low"),
        ])
        .await
        .unwrap();
    let provider = HashEmbedder::new(1024);
    let options = RefreshOptions { batch_size: 2, ..RefreshOptions::default() };

    let report = refresh_vectors(&store, &provider, &options).await.unwrap();
    assert_eq!((report.scanned, report.embedded, report.failed), (3, 3, 0));
    assert!(store.get("i1").await.unwrap().has_vectors());

    let again = refresh_vectors(&store, &provider, &options).await.unwrap();
    assert_eq!(again.scanned, 0);

    let hits = store.search(&provider.embed_sync("centrifuge rotor"), Partition::sections(Corpus::IssueReport), 1).await.unwrap();
    assert!(hits.iter().any(|h| h.id == "i1"));
}

#[tokio::test]
async fn refresh_respects_limit() {
    let store = MemoryCorpusStore::new();
    store.upsert_items(&[item("a", "A", "a"), item("b", "B", "b")]).await.unwrap();
    let options = RefreshOptions { limit: Some(1), ..RefreshOptions::default() };
    let report = refresh_vectors(&store, &HashEmbedder::new(16), &options).await.unwrap();
    assert_eq!(report.embedded, 1);
    assert_eq!(store.items_needing_vectors(Some(10)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn embed_failures_are_counted_not_raised() {
    let store = MemoryCorpusStore::new();
    store.upsert_items(&[item("a", "A", "a")]).await.unwrap();
    let report = refresh_vectors(&store, &FailingProvider, &RefreshOptions::default()).await.unwrap();
    assert_eq!((report.embedded, report.failed), (0, 1));
    assert!(!store.get("a").await.unwrap().has_vectors());
}

#[tokio::test]
async fn dimension_mismatch_aborts_refresh() {
    let store = MemoryCorpusStore::new();
    store.upsert_items(&[item("a", "A", "a")]).await.unwrap();
    let err = refresh_vectors(&store, &ShortProvider, &RefreshOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 4 }));
}

#[tokio::test]
async fn unlimited_refresh_reaches_every_pending_item() {
    let store = MemoryCorpusStore::new();
    let items: Vec<CorpusItem> = (0..40).map(|i| item(&format!("i{i}"), &format!("Title {i}"), &format!("Body {i}"))).collect();
    store.upsert_items(&items).await.unwrap();
    assert_eq!(store.items_needing_vectors(None).await.unwrap().len(), 40);

    let report = refresh_vectors(&store, &HashEmbedder::new(16), &RefreshOptions::default()).await.unwrap();

    assert_eq!((report.scanned, report.embedded), (40, 40));
    assert!(store.items_needing_vectors(None).await.unwrap().is_empty());
}
