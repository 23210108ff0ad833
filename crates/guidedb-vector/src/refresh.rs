//! Vector refresh pipeline step.
//!
//! Selection is hash-driven: an item is pending when a vector is missing or
//! its vectors were computed from text that no longer matches `content_hash`.
//! For each batch we embed titles and contents, check dimensionality and write
//! the vectors back. A failed batch is counted and skipped; it is picked up
//! again by the next run.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use guidedb_core::traits::{EmbeddingProvider, VectorWriter};
use guidedb_core::types::{PendingItem, VectorUpdate};
use guidedb_core::{Error, Result};

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub show_progress: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self { batch_size: 32, limit: None, show_progress: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub scanned: usize,
    pub embedded: usize,
    pub failed: usize,
}

pub async fn refresh_vectors(
    writer: &dyn VectorWriter,
    provider: &dyn EmbeddingProvider,
    options: &RefreshOptions,
) -> Result<RefreshReport> {
    let pending = writer.items_needing_vectors(options.limit).await?;
    let mut report = RefreshReport { scanned: pending.len(), ..RefreshReport::default() };
    if pending.is_empty() {
        info!("no items need vectors");
        return Ok(report);
    }

    let pb = options.show_progress.then(|| progress_bar(pending.len()));
    for batch in pending.chunks(options.batch_size.max(1)) {
        match embed_batch(provider, batch).await {
            Ok(updates) => {
                report.embedded += writer.write_vectors(&updates).await?;
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, items = batch.len(), "embedding batch failed, skipping");
                report.failed += batch.len();
            }
            Err(e) => return Err(e),
        }
        if let Some(pb) = &pb { pb.inc(batch.len() as u64); }
    }
    if let Some(pb) = pb { pb.finish_with_message("vectors refreshed"); }

    info!(scanned = report.scanned, embedded = report.embedded, failed = report.failed, model = provider.model_id(), "vector refresh finished");
    Ok(report)
}

async fn embed_batch(provider: &dyn EmbeddingProvider, batch: &[PendingItem]) -> Result<Vec<VectorUpdate>> {
    let titles: Vec<String> = batch.iter().map(|p| p.title.clone()).collect();
    let contents: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
    let title_vectors = provider.embed_batch(&titles).await?;
    let content_vectors = provider.embed_batch(&contents).await?;
    if title_vectors.len() != batch.len() || content_vectors.len() != batch.len() {
        return Err(Error::Embed(format!(
            "provider returned {} title / {} content vectors for {} items",
            title_vectors.len(),
            content_vectors.len(),
            batch.len()
        )));
    }
    let dim = provider.dim();
    batch
        .iter()
        .zip(title_vectors.into_iter().zip(content_vectors))
        .map(|(item, (title_vector, content_vector))| {
            for v in [&title_vector, &content_vector] {
                if v.len() != dim {
                    return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
                }
            }
            Ok(VectorUpdate { id: item.id.clone(), title_vector, content_vector, content_hash: item.content_hash.clone() })
        })
        .collect()
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({percent}%) {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
