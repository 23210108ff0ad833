use guidedb_core::processor::parse_guide;
use guidedb_core::traits::{CorpusRepository, VectorStore, VectorWriter};
use guidedb_core::types::{Corpus, Partition};
use guidedb_embed::HashEmbedder;
use guidedb_vector::table::vector_status;
use guidedb_vector::{refresh_vectors, LanceCorpusStore, RefreshOptions};
use tempfile::TempDir;

const GUIDE: &str = "# Autoclave Protocol\n\nSterilize glassware.\n\n## Loading\n\nLeave space between items.\n\n## Cycle selection\n\nUse liquid cycle for media.\n";

/// Exercises LanceDB on a temp directory. Slow on first build; run with
/// `cargo test -p guidedb-vector --test lance_flow -- --ignored`.
#[ignore]
#[tokio::test]
async fn lance_ingest_refresh_search() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let dim = 64;
    let store = LanceCorpusStore::open(tmp.path(), "corpus_items_test", dim).await?;
    let items = parse_guide("protocol_guide:autoclave.md", Corpus::ProtocolGuide, "autoclave", GUIDE);
    assert_eq!(items.len(), 4);

    store.upsert_items(&items).await?;
    let (total, with_vectors) = vector_status(store.connection(), store.table_name()).await?;
    assert_eq!((total, with_vectors), (4, 0));

    let provider = HashEmbedder::new(dim);
    let report = refresh_vectors(&store, &provider, &RefreshOptions::default()).await?;
    assert_eq!(report.embedded, 4);
    let (_, with_vectors) = vector_status(store.connection(), store.table_name()).await?;
    assert_eq!(with_vectors, 4);

    // Re-ingesting unchanged text keeps vectors in place.
    store.upsert_items(&items).await?;
    assert!(store.items_needing_vectors(Some(10)).await?.is_empty());

    let hits = store.search(&provider.embed_sync("cycle selection"), Partition::sections(Corpus::ProtocolGuide), 2).await?;
    assert!(hits.iter().any(|h| h.id == "protocol_guide:autoclave.md#3"));
    assert!(hits.iter().all(|h| h.title_sim.is_some() && h.content_sim.is_some()));

    let meta = store.fetch_item_metadata(&["protocol_guide:autoclave.md".to_string()]).await?;
    assert_eq!(meta[0].title, "Autoclave Protocol");
    assert_eq!(meta[0].heading_level, 0);
    Ok(())
}

/// Default refresh options carry no limit; the pending scan must not send one.
#[ignore]
#[tokio::test]
async fn lance_unlimited_refresh_and_prune() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let dim = 32;
    let store = LanceCorpusStore::open(tmp.path(), "corpus_items_prune", dim).await?;
    let mut items = parse_guide("protocol_guide:autoclave.md", Corpus::ProtocolGuide, "autoclave", GUIDE);
    items.extend(parse_guide("protocol_guide:freezer.md", Corpus::ProtocolGuide, "freezer", "# Freezer\n\nKeep at -80.\n"));
    store.upsert_items(&items).await?;

    assert_eq!(store.items_needing_vectors(None).await?.len(), items.len());
    let report = refresh_vectors(&store, &HashEmbedder::new(dim), &RefreshOptions::default()).await?;
    assert_eq!(report.embedded, items.len());
    assert!(store.items_needing_vectors(None).await?.is_empty());

    // The freezer guide is gone from disk.
    let keep: Vec<String> = items.iter().filter(|i| !i.id.starts_with("protocol_guide:freezer.md")).map(|i| i.id.clone()).collect();
    let removed = store.prune_items(&keep).await?;
    assert_eq!(removed.len(), 2);
    assert!(removed.iter().all(|id| id.starts_with("protocol_guide:freezer.md")));
    let (total, with_vectors) = vector_status(store.connection(), store.table_name()).await?;
    assert_eq!((total, with_vectors), (4, 4));
    Ok(())
}
