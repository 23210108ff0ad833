//! guidedb-text
//!
//! Tantivy keyword index over corpus item titles and contents. Feeds the
//! lexical side of reciprocal-rank fusion.

pub mod tantivy_utils;
pub mod index;

pub use index::KeywordIndex;
