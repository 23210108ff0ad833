//! guidedb-vector
//!
//! Vector store and corpus repository implementations (in-memory and
//! LanceDB), plus the vector refresh pipeline step that fills in missing or
//! stale title/content vectors.

pub mod hash;
pub mod lance;
pub mod memory;
pub mod refresh;
pub mod schema;
pub mod similarity;
pub mod table;

pub use lance::LanceCorpusStore;
pub use memory::MemoryCorpusStore;
pub use refresh::{refresh_vectors, RefreshOptions, RefreshReport};
