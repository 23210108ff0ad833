//! In-memory corpus store for tests and small deployments.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use guidedb_core::traits::{CorpusRepository, VectorStore, VectorWriter};
use guidedb_core::types::{
    CorpusItem, ItemId, ItemMetadata, ItemVectors, Partition, PendingItem, VectorHit, VectorUpdate,
};
use guidedb_core::Result;

use crate::hash::content_hash;
use crate::similarity::{score_item, union_top_n};

#[derive(Debug, Clone)]
struct StoredItem {
    item: CorpusItem,
    content_hash: String,
    /// Hash of the text the current vectors were computed from.
    vector_hash: Option<String>,
}

impl StoredItem {
    fn needs_vectors(&self) -> bool {
        !self.item.has_vectors() || self.vector_hash.as_deref() != Some(self.content_hash.as_str())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCorpusStore {
    items: RwLock<BTreeMap<ItemId, StoredItem>>,
}

impl MemoryCorpusStore {
    pub fn new() -> Self { Self::default() }

    /// Seed a store with items as given, trusting any vectors they carry.
    pub fn from_items(items: Vec<CorpusItem>) -> Self {
        let map = items
            .into_iter()
            .map(|item| {
                let hash = content_hash(&item.title, &item.content);
                let vector_hash = item.has_vectors().then(|| hash.clone());
                (item.id.clone(), StoredItem { item, content_hash: hash, vector_hash })
            })
            .collect();
        Self { items: RwLock::new(map) }
    }

    pub async fn len(&self) -> usize { self.items.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.items.read().await.is_empty() }

    pub async fn get(&self, id: &str) -> Option<CorpusItem> {
        self.items.read().await.get(id).map(|s| s.item.clone())
    }
}

#[async_trait]
impl VectorStore for MemoryCorpusStore {
    async fn search(&self, query_vector: &[f32], partition: Partition, top_n: usize) -> Result<Vec<VectorHit>> {
        let items = self.items.read().await;
        let mut hits = Vec::new();
        for stored in items.values().filter(|s| s.item.partition == partition) {
            let item = &stored.item;
            hits.push(score_item(query_vector, &item.id, item.title_vector.as_deref(), item.content_vector.as_deref())?);
        }
        Ok(union_top_n(hits, top_n))
    }
}

#[async_trait]
impl CorpusRepository for MemoryCorpusStore {
    async fn fetch_vectors_by_partition(&self, partition: Partition, ids: &[ItemId]) -> Result<Vec<ItemVectors>> {
        let items = self.items.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| items.get(id))
            .filter(|s| s.item.partition == partition)
            .map(|s| ItemVectors {
                id: s.item.id.clone(),
                title_vector: s.item.title_vector.clone(),
                content_vector: s.item.content_vector.clone(),
            })
            .collect())
    }

    async fn fetch_item_metadata(&self, ids: &[ItemId]) -> Result<Vec<ItemMetadata>> {
        let items = self.items.read().await;
        Ok(ids.iter().filter_map(|id| items.get(id)).map(|s| s.item.metadata()).collect())
    }
}

#[async_trait]
impl VectorWriter for MemoryCorpusStore {
    async fn upsert_items(&self, incoming: &[CorpusItem]) -> Result<usize> {
        let mut items = self.items.write().await;
        for item in incoming {
            let hash = content_hash(&item.title, &item.content);
            let mut next = item.clone();
            let mut vector_hash = item.has_vectors().then(|| hash.clone());
            if !item.has_vectors() {
                if let Some(prev) = items.get(&item.id) {
                    next.title_vector = prev.item.title_vector.clone();
                    next.content_vector = prev.item.content_vector.clone();
                    vector_hash = prev.vector_hash.clone();
                }
            }
            items.insert(item.id.clone(), StoredItem { item: next, content_hash: hash, vector_hash });
        }
        Ok(incoming.len())
    }

    async fn items_needing_vectors(&self, limit: Option<usize>) -> Result<Vec<PendingItem>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|s| s.needs_vectors())
            .take(limit.unwrap_or(usize::MAX))
            .map(|s| PendingItem {
                id: s.item.id.clone(),
                title: s.item.title.clone(),
                content: s.item.content.clone(),
                content_hash: s.content_hash.clone(),
            })
            .collect())
    }

    async fn write_vectors(&self, updates: &[VectorUpdate]) -> Result<usize> {
        let mut items = self.items.write().await;
        let mut written = 0;
        for update in updates {
            if let Some(stored) = items.get_mut(&update.id) {
                stored.item.title_vector = Some(update.title_vector.clone());
                stored.item.content_vector = Some(update.content_vector.clone());
                stored.vector_hash = Some(update.content_hash.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn prune_items(&self, keep: &[ItemId]) -> Result<Vec<ItemId>> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let mut items = self.items.write().await;
        let stale: Vec<ItemId> = items.keys().filter(|id| !keep.contains(id.as_str())).cloned().collect();
        for id in &stale { items.remove(id); }
        Ok(stale)
    }
}
