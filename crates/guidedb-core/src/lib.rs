//! guidedb-core
//!
//! Domain types, error taxonomy and collaborator traits shared by the
//! embedding, vector, keyword and retrieval crates.

pub mod config;
pub mod error;
pub mod processor;
pub mod similarity;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
