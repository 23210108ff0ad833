//! LanceDB connection and housekeeping helpers.

use anyhow::Result;
use arrow_array::RecordBatchIterator;
use lancedb::{connect, Connection};
use lancedb::query::ExecutableQuery;
use std::sync::Arc;

use crate::schema::build_corpus_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> Result<()> {
    let names = conn.table_names().execute().await?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

pub async fn ensure_corpus_table(conn: &Connection, name: &str, dim: usize) -> Result<()> {
    ensure_table(conn, name, build_corpus_schema(dim)).await
}

/// Count rows and rows with both vectors present.
pub async fn vector_status(conn: &Connection, name: &str) -> Result<(usize, usize)> {
    use arrow_array::Array;
    let t = conn.open_table(name).execute().await?;
    let (mut total, mut with_vectors) = (0usize, 0usize);
    let mut stream = t.query().execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        total += batch.num_rows();
        let title = batch.column_by_name(crate::schema::TITLE_VECTOR);
        let content = batch.column_by_name(crate::schema::CONTENT_VECTOR);
        if let (Some(title), Some(content)) = (title, content) {
            for i in 0..batch.num_rows() { if title.is_valid(i) && content.is_valid(i) { with_vectors += 1; } }
        }
    }
    Ok((total, with_vectors))
}

/// `'a','b'` with single quotes escaped, for `IN (...)` filters over ids.
pub(crate) fn quoted_list<S: AsRef<str>>(values: &[S]) -> String {
    values.iter().map(|v| format!("'{}'", v.as_ref().replace('\'', "''"))).collect::<Vec<_>>().join(",")
}
