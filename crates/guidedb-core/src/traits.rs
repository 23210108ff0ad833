use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CorpusItem, ItemId, ItemMetadata, ItemVectors, KeywordHit, Partition, PendingItem, VectorHit,
    VectorUpdate,
};

/// Maps text to a fixed-length vector.
///
/// Same text and same model must yield a bit-identical vector. A vector whose
/// length differs from `dim()` is reported as `Error::DimensionMismatch`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d1024`).
    fn model_id(&self) -> &str;
    /// Declared embedding dimensionality.
    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Cosine similarity search over the title and content vectors of one partition.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        query_vector: &[f32],
        partition: Partition,
        top_n: usize,
    ) -> Result<Vec<VectorHit>>;
}

/// Read access to stored items, limited to what the engine needs.
#[async_trait]
pub trait CorpusRepository: Send + Sync {
    async fn fetch_vectors_by_partition(
        &self,
        partition: Partition,
        ids: &[ItemId],
    ) -> Result<Vec<ItemVectors>>;

    async fn fetch_item_metadata(&self, ids: &[ItemId]) -> Result<Vec<ItemMetadata>>;
}

/// Write side used by ingestion and the vector refresh pipeline.
#[async_trait]
pub trait VectorWriter: Send + Sync {
    /// Insert or replace items. Stored vectors survive when the item's text is
    /// unchanged.
    async fn upsert_items(&self, items: &[CorpusItem]) -> Result<usize>;

    /// Items with a missing vector or vectors computed from older text.
    /// `None` returns all of them.
    async fn items_needing_vectors(&self, limit: Option<usize>) -> Result<Vec<PendingItem>>;

    async fn write_vectors(&self, updates: &[VectorUpdate]) -> Result<usize>;

    /// Delete every stored item whose id is not in `keep`; returns the
    /// deleted ids.
    async fn prune_items(&self, keep: &[ItemId]) -> Result<Vec<ItemId>>;
}

/// Lexical search returning ids ranked best-first.
pub trait KeywordSearcher: Send + Sync {
    fn search_keywords(
        &self,
        query: &str,
        partition: Partition,
        limit: usize,
    ) -> Result<Vec<KeywordHit>>;
}
