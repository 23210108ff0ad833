//! Domain types shared by the stores, the keyword index and the retrieval engine.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ItemId = String;

/// The two guide collections that can be searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    ProtocolGuide,
    IssueReport,
}

impl Corpus {
    pub const ALL: [Corpus; 2] = [Corpus::ProtocolGuide, Corpus::IssueReport];

    pub fn as_str(&self) -> &'static str {
        match self {
            Corpus::ProtocolGuide => "protocol_guide",
            Corpus::IssueReport => "issue_report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Whole-document entries (`heading_level == 0`).
    Document,
    /// Heading-delimited sections (`heading_level >= 1`).
    Section,
}

/// A corpus partition: which collection, at which granularity.
///
/// Every store query is keyed by a `Partition`; the `source_table` tag is
/// derived from it and never built from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub corpus: Corpus,
    pub granularity: Granularity,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::documents(Corpus::ProtocolGuide),
        Partition::sections(Corpus::ProtocolGuide),
        Partition::documents(Corpus::IssueReport),
        Partition::sections(Corpus::IssueReport),
    ];

    pub const fn documents(corpus: Corpus) -> Self {
        Self { corpus, granularity: Granularity::Document }
    }

    pub const fn sections(corpus: Corpus) -> Self {
        Self { corpus, granularity: Granularity::Section }
    }

    /// The `source_table` tag, e.g. `protocol_guide_section`.
    pub fn as_str(&self) -> &'static str {
        match (self.corpus, self.granularity) {
            (Corpus::ProtocolGuide, Granularity::Document) => "protocol_guide",
            (Corpus::ProtocolGuide, Granularity::Section) => "protocol_guide_section",
            (Corpus::IssueReport, Granularity::Document) => "issue_report",
            (Corpus::IssueReport, Granularity::Section) => "issue_report_section",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn is_section(&self) -> bool {
        self.granularity == Granularity::Section
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A searchable unit: either a whole document (`heading_level == 0`) or one
/// of its sections.
///
/// Vectors are populated out of band by the refresh pipeline and stay `None`
/// until then; the engine skips items with either vector missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusItem {
    pub id: ItemId,
    pub partition: Partition,
    pub title: String,
    pub content: String,
    pub heading_level: u8,
    pub parent_document_id: Option<ItemId>,
    pub title_vector: Option<Vec<f32>>,
    pub content_vector: Option<Vec<f32>>,
}

impl CorpusItem {
    pub fn source_table(&self) -> &'static str {
        self.partition.as_str()
    }

    pub fn is_document(&self) -> bool {
        self.heading_level == 0
    }

    pub fn has_vectors(&self) -> bool {
        self.title_vector.is_some() && self.content_vector.is_some()
    }

    pub fn metadata(&self) -> ItemMetadata {
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

/// Display data for an item, without its vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: ItemId,
    pub partition: Partition,
    pub title: String,
    pub content: String,
    pub heading_level: u8,
    pub parent_document_id: Option<ItemId>,
}

/// The stored vectors of one item, as read back from a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemVectors {
    pub id: ItemId,
    pub title_vector: Option<Vec<f32>>,
    pub content_vector: Option<Vec<f32>>,
}

/// One row of a vector store search.
///
/// A column is `None` when the item has no vector of that kind; it is never
/// reported as a zero similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: ItemId,
    pub title_sim: Option<f32>,
    pub content_sim: Option<f32>,
}

/// One row of a keyword search. `score` is normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub id: ItemId,
    pub score: f64,
}

/// An item whose vectors are missing or were computed from older text.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub id: ItemId,
    pub title: String,
    pub content: String,
    pub content_hash: String,
}

/// Freshly computed vectors for one item, tagged with the hash of the text
/// they were computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorUpdate {
    pub id: ItemId,
    pub title_vector: Vec<f32>,
    pub content_vector: Vec<f32>,
    pub content_hash: String,
}

/// Which pass of the escalation controller produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    Stage1,
    Stage2,
}

impl StageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageTag::Stage1 => "stage1",
            StageTag::Stage2 => "stage2",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
