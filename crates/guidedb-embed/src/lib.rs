//! Embedding providers: a candle BGE-M3 model and a deterministic hashing
//! embedder for tests and development.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use guidedb_core::config::{expand_path, EmbeddingSettings};
use guidedb_core::traits::EmbeddingProvider;
use guidedb_core::Error;

pub mod device;
pub mod pool;
pub mod tokenize;
mod fake;
mod model;

pub use fake::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

/// Reject a vector whose length differs from the declared dimensionality.
pub fn check_dim(expected: usize, v: &[f32]) -> guidedb_core::Result<()> {
    if v.len() == expected { Ok(()) } else { Err(Error::DimensionMismatch { expected, actual: v.len() }) }
}

/// Pick the provider described by `settings`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder regardless of settings.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    if settings.dimension == 0 {
        anyhow::bail!("embedding.dimension must be positive");
    }
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if use_fake || settings.use_fake {
        info!(dim = settings.dimension, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    let model_dir: Option<PathBuf> = settings.model_dir.as_deref().map(expand_path);
    Ok(Arc::new(BgeM3Embedder::load(model_dir.as_deref(), settings.dimension)?))
}
