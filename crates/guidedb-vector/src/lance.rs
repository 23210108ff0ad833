//! LanceDB-backed corpus store.
//!
//! All partitions share one table; every query filters on the `partition`
//! column using the tag from [`Partition::as_str`], so no caller-provided
//! string reaches a table name or filter.

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMillisecondArray,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use guidedb_core::traits::{CorpusRepository, VectorStore, VectorWriter};
use guidedb_core::types::{
    CorpusItem, ItemId, ItemMetadata, ItemVectors, Partition, PendingItem, VectorHit, VectorUpdate,
};
use guidedb_core::Error;

use crate::hash::content_hash;
use crate::schema::{build_corpus_schema, CONTENT_VECTOR, TITLE_VECTOR};
use crate::similarity::{score_item, union_top_n};
use crate::table::{ensure_corpus_table, open_db, quoted_list};

/// One decoded table row.
#[derive(Debug, Clone)]
struct StoredRow {
    id: String,
    partition: Partition,
    title: String,
    content: String,
    heading_level: u8,
    parent_document_id: Option<String>,
    content_hash: String,
    vector_hash: Option<String>,
    title_vector: Option<Vec<f32>>,
    content_vector: Option<Vec<f32>>,
}

impl StoredRow {
    fn metadata(&self) -> ItemMetadata {
        ItemMetadata {
            id: self.id.clone(),
            partition: self.partition,
            title: self.title.clone(),
            content: self.content.clone(),
            heading_level: self.heading_level,
            parent_document_id: self.parent_document_id.clone(),
        }
    }
}

pub struct LanceCorpusStore { db: Connection, table_name: String, dim: usize }

impl LanceCorpusStore {
    pub async fn open(db_path: &Path, table_name: &str, dim: usize) -> Result<Self> {
        let db = open_db(db_path.to_string_lossy().as_ref()).await?;
        ensure_corpus_table(&db, table_name, dim).await?;
        Ok(Self { db, table_name: table_name.to_string(), dim })
    }

    pub fn connection(&self) -> &Connection { &self.db }

    pub fn table_name(&self) -> &str { &self.table_name }

    async fn query_rows(&self, filter: Option<String>, limit: Option<usize>) -> Result<Vec<StoredRow>> {
        let t = self.db.open_table(&self.table_name).execute().await?;
        let mut query = t.query();
        if let Some(filter) = filter { query = query.only_if(filter); }
        if let Some(limit) = limit { query = query.limit(limit); }
        let mut stream = query.execute().await?;
        let mut rows = Vec::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
            rows.extend(rows_from_batch(&batch)?);
        }
        Ok(rows)
    }

    async fn rows_by_id(&self, ids: &[String], partition: Option<Partition>) -> Result<HashMap<String, StoredRow>> {
        if ids.is_empty() { return Ok(HashMap::new()); }
        let mut filter = format!("id IN ({})", quoted_list(ids));
        if let Some(p) = partition { filter = format!("partition = '{}' AND {}", p.as_str(), filter); }
        Ok(self.query_rows(Some(filter), None).await?.into_iter().map(|r| (r.id.clone(), r)).collect())
    }

    async fn all_ids(&self) -> Result<Vec<String>> {
        let t = self.db.open_table(&self.table_name).execute().await?;
        let mut stream = t.query().select(Select::columns(&["id"])).execute().await?;
        let mut ids = Vec::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
            let id_col = string_col(&batch, "id")?;
            for i in 0..batch.num_rows() { ids.push(id_col.value(i).to_string()); }
        }
        Ok(ids)
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() { return Ok(()); }
        let t = self.db.open_table(&self.table_name).execute().await?;
        t.delete(&format!("id IN ({})", quoted_list(ids))).await?;
        Ok(())
    }

    async fn merge_rows(&self, rows: &[StoredRow]) -> Result<()> {
        if rows.is_empty() { return Ok(()); }
        let batch = self.rows_to_record_batch(rows)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let t = self.db.open_table(&self.table_name).execute().await?;
        let mut mi = t.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        let _ = mi.execute(reader).await?;
        Ok(())
    }

    async fn ann_ids(&self, query_vector: &[f32], column: &str, partition: Partition, top_n: usize) -> Result<Vec<String>> {
        let t = self.db.open_table(&self.table_name).execute().await?;
        let filter = format!("partition = '{}' AND {} IS NOT NULL", partition.as_str(), column);
        let mut stream = t
            .vector_search(query_vector.to_vec())?
            .column(column)
            .distance_type(DistanceType::Cosine)
            .only_if(filter)
            .select(Select::columns(&["id"]))
            .limit(top_n)
            .execute()
            .await?;
        let mut ids = Vec::new();
        while let Some(batch) = TryStreamExt::try_next(&mut stream).await? {
            let id_col = string_col(&batch, "id")?;
            for i in 0..batch.num_rows() { ids.push(id_col.value(i).to_string()); }
        }
        Ok(ids)
    }

    async fn search_rows(&self, query_vector: &[f32], partition: Partition, top_n: usize) -> Result<Vec<StoredRow>> {
        let mut ids = self.ann_ids(query_vector, TITLE_VECTOR, partition, top_n).await?;
        let mut seen: HashSet<String> = ids.iter().cloned().collect();
        for id in self.ann_ids(query_vector, CONTENT_VECTOR, partition, top_n).await? {
            if seen.insert(id.clone()) { ids.push(id); }
        }
        debug!(partition = %partition, candidates = ids.len(), "lance candidates");
        Ok(self.rows_by_id(&ids, Some(partition)).await?.into_values().collect())
    }

    fn rows_to_record_batch(&self, rows: &[StoredRow]) -> Result<RecordBatch> {
        let schema = build_corpus_schema(self.dim);
        let now = Utc::now().timestamp_millis();
        let to_list = |v: &Option<Vec<f32>>| v.as_ref().map(|v| v.iter().map(|&x| Some(x)).collect::<Vec<_>>());
        for r in rows {
            for v in [&r.title_vector, &r.content_vector].into_iter().flatten() {
                if v.len() != self.dim { return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() }.into()); }
            }
        }
        let batch = RecordBatch::try_new(schema, vec![
            Arc::new(StringArray::from(rows.iter().map(|r| r.id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.partition.as_str()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.title.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.content.clone()).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(rows.iter().map(|r| i32::from(r.heading_level)).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.parent_document_id.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.content_hash.clone()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(rows.iter().map(|r| r.vector_hash.clone()).collect::<Vec<_>>())),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(rows.iter().map(|r| to_list(&r.title_vector)), self.dim as i32)),
            Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(rows.iter().map(|r| to_list(&r.content_vector)), self.dim as i32)),
            Arc::new(TimestampMillisecondArray::from(vec![now; rows.len()])),
        ])?;
        Ok(batch)
    }
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("missing {} column", name))
}

fn vector_at(col: &FixedSizeListArray, i: usize) -> Option<Vec<f32>> {
    if col.is_null(i) { return None; }
    Some(col.value(i).as_primitive::<Float32Type>().values().to_vec())
}

fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<StoredRow>> {
    let id = string_col(batch, "id")?;
    let partition = string_col(batch, "partition")?;
    let title = string_col(batch, "title")?;
    let content = string_col(batch, "content")?;
    let parent = string_col(batch, "parent_document_id")?;
    let chash = string_col(batch, "content_hash")?;
    let vhash = string_col(batch, "vector_hash")?;
    let level = batch.column_by_name("heading_level").and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| anyhow!("missing heading_level column"))?;
    let tvec = batch.column_by_name(TITLE_VECTOR).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>()).ok_or_else(|| anyhow!("missing {} column", TITLE_VECTOR))?;
    let cvec = batch.column_by_name(CONTENT_VECTOR).and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>()).ok_or_else(|| anyhow!("missing {} column", CONTENT_VECTOR))?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let tag = partition.value(i);
        let partition = Partition::parse(tag).ok_or_else(|| anyhow!("unknown partition tag '{}'", tag))?;
        rows.push(StoredRow {
            id: id.value(i).to_string(),
            partition,
            title: title.value(i).to_string(),
            content: content.value(i).to_string(),
            heading_level: u8::try_from(level.value(i)).unwrap_or(u8::MAX),
            parent_document_id: (!parent.is_null(i)).then(|| parent.value(i).to_string()),
            content_hash: chash.value(i).to_string(),
            vector_hash: (!vhash.is_null(i)).then(|| vhash.value(i).to_string()),
            title_vector: vector_at(tvec, i),
            content_vector: vector_at(cvec, i),
        });
    }
    Ok(rows)
}

fn store_err(e: anyhow::Error) -> Error {
    match e.downcast::<Error>() {
        Ok(inner) => inner,
        Err(e) => Error::VectorStore(e.to_string()),
    }
}

#[async_trait]
impl VectorStore for LanceCorpusStore {
    async fn search(&self, query_vector: &[f32], partition: Partition, top_n: usize) -> guidedb_core::Result<Vec<VectorHit>> {
        if query_vector.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query_vector.len() });
        }
        let rows = self.search_rows(query_vector, partition, top_n).await.map_err(store_err)?;
        let mut hits = Vec::with_capacity(rows.len());
        for r in &rows {
            hits.push(score_item(query_vector, &r.id, r.title_vector.as_deref(), r.content_vector.as_deref())?);
        }
        Ok(union_top_n(hits, top_n))
    }
}

#[async_trait]
impl CorpusRepository for LanceCorpusStore {
    async fn fetch_vectors_by_partition(&self, partition: Partition, ids: &[ItemId]) -> guidedb_core::Result<Vec<ItemVectors>> {
        let mut rows = self.rows_by_id(ids, Some(partition)).await.map_err(store_err)?;
        Ok(ids
            .iter()
            .filter_map(|id| rows.remove(id))
            .map(|r| ItemVectors { id: r.id, title_vector: r.title_vector, content_vector: r.content_vector })
            .collect())
    }

    async fn fetch_item_metadata(&self, ids: &[ItemId]) -> guidedb_core::Result<Vec<ItemMetadata>> {
        let rows = self.rows_by_id(ids, None).await.map_err(store_err)?;
        Ok(ids.iter().filter_map(|id| rows.get(id)).map(StoredRow::metadata).collect())
    }
}

#[async_trait]
impl VectorWriter for LanceCorpusStore {
    async fn upsert_items(&self, items: &[CorpusItem]) -> guidedb_core::Result<usize> {
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let existing = self.rows_by_id(&ids, None).await.map_err(store_err)?;
        let rows: Vec<StoredRow> = items
            .iter()
            .map(|item| {
                let hash = content_hash(&item.title, &item.content);
                let prev = existing.get(&item.id).filter(|_| !item.has_vectors());
                StoredRow {
                    id: item.id.clone(),
                    partition: item.partition,
                    title: item.title.clone(),
                    content: item.content.clone(),
                    heading_level: item.heading_level,
                    parent_document_id: item.parent_document_id.clone(),
                    vector_hash: match prev {
                        Some(p) => p.vector_hash.clone(),
                        None => item.has_vectors().then(|| hash.clone()),
                    },
                    content_hash: hash,
                    title_vector: prev.map_or_else(|| item.title_vector.clone(), |p| p.title_vector.clone()),
                    content_vector: prev.map_or_else(|| item.content_vector.clone(), |p| p.content_vector.clone()),
                }
            })
            .collect();
        self.merge_rows(&rows).await.map_err(store_err)?;
        debug!(rows = rows.len(), table = %self.table_name, "upserted corpus items");
        Ok(rows.len())
    }

    async fn items_needing_vectors(&self, limit: Option<usize>) -> guidedb_core::Result<Vec<PendingItem>> {
        let filter = format!(
            "{TITLE_VECTOR} IS NULL OR {CONTENT_VECTOR} IS NULL OR vector_hash IS NULL OR vector_hash != content_hash"
        );
        let rows = self.query_rows(Some(filter), limit).await.map_err(store_err)?;
        Ok(rows
            .into_iter()
            .map(|r| PendingItem { id: r.id, title: r.title, content: r.content, content_hash: r.content_hash })
            .collect())
    }

    async fn write_vectors(&self, updates: &[VectorUpdate]) -> guidedb_core::Result<usize> {
        let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
        let mut existing = self.rows_by_id(&ids, None).await.map_err(store_err)?;
        let mut rows = Vec::with_capacity(updates.len());
        for u in updates {
            if let Some(mut row) = existing.remove(&u.id) {
                row.title_vector = Some(u.title_vector.clone());
                row.content_vector = Some(u.content_vector.clone());
                row.vector_hash = Some(u.content_hash.clone());
                rows.push(row);
            }
        }
        self.merge_rows(&rows).await.map_err(store_err)?;
        Ok(rows.len())
    }

    async fn prune_items(&self, keep: &[ItemId]) -> guidedb_core::Result<Vec<ItemId>> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let stale: Vec<ItemId> = self
            .all_ids()
            .await
            .map_err(store_err)?
            .into_iter()
            .filter(|id| !keep.contains(id.as_str()))
            .collect();
        self.delete_ids(&stale).await.map_err(store_err)?;
        debug!(removed = stale.len(), table = %self.table_name, "pruned corpus items");
        Ok(stale)
    }
}
