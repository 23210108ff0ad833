use guidedb_core::processor::parse_guide;
use guidedb_core::traits::KeywordSearcher;
use guidedb_core::types::{Corpus, Partition};
use guidedb_text::KeywordIndex;

const CENTRIFUGE: &str = "# Centrifuge Errors\n\nCommon faults.\n\n## Imbalance\n\nError E-1042 means the rotor is out of balance. Reload tubes symmetrically.\n\n## Lid lock\n\nThe lid sensor reports LID_OPEN when the latch is worn.\n";
const ISSUE: &str = "# Rotor imbalance at 4000 rpm\n\nCustomer saw E-1042 twice during a run.\n";

fn seeded() -> KeywordIndex {
    let index = KeywordIndex::create_in_ram().expect("index");
    let mut items = parse_guide("protocol_guide:centrifuge.md", Corpus::ProtocolGuide, "centrifuge", CENTRIFUGE);
    items.extend(parse_guide("issue_report:issues/rotor.md", Corpus::IssueReport, "rotor", ISSUE));
    let n = index.index_items(&items).expect("index items");
    assert_eq!(n, items.len());
    index
}

#[test]
fn error_code_finds_section() {
    let index = seeded();
    let hits = index.search_keywords("E-1042", Partition::sections(Corpus::ProtocolGuide), 5).expect("search");
    assert_eq!(hits[0].id, "protocol_guide:centrifuge.md#2");
    assert!((hits[0].score - 1.0).abs() < 1e-9);
    assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
}

#[test]
fn partition_restricts_results() {
    let index = seeded();
    let hits = index.search_keywords("E-1042", Partition::documents(Corpus::IssueReport), 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "issue_report:issues/rotor.md");

    let docs = index.search_keywords("LID_OPEN", Partition::documents(Corpus::IssueReport), 5).expect("search");
    assert!(docs.is_empty());
}

#[test]
fn stop_words_and_zero_limit_return_nothing() {
    let index = seeded();
    let p = Partition::sections(Corpus::ProtocolGuide);
    assert!(index.search_keywords("the of and", p, 5).expect("search").is_empty());
    assert!(index.search_keywords("rotor", p, 0).expect("search").is_empty());
}

#[test]
fn reindexing_replaces_by_id() {
    let index = seeded();
    let items = parse_guide("protocol_guide:centrifuge.md", Corpus::ProtocolGuide, "centrifuge", "# Centrifuge Errors\n\nNothing here.\n\n## Imbalance\n\nSee the rotor manual.\n");
    index.index_items(&items).expect("reindex");
    let p = Partition::sections(Corpus::ProtocolGuide);
    let hits = index.search_keywords("rotor", p, 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "protocol_guide:centrifuge.md#2");
}

#[test]
fn quoted_phrase_ranks_exact_match_first() {
    let index = seeded();
    let hits = index.search_keywords("\"lid sensor\" latch", Partition::sections(Corpus::ProtocolGuide), 5).expect("search");
    assert_eq!(hits[0].id, "protocol_guide:centrifuge.md#3");
}

#[test]
fn index_persists_in_dir() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    let dir = tmp.path().join("tantivy");
    {
        let index = KeywordIndex::create_in_dir(dir.clone()).expect("create");
        let items = parse_guide("issue_report:issues/rotor.md", Corpus::IssueReport, "rotor", ISSUE);
        index.index_items(&items).expect("index");
    }
    let reopened = KeywordIndex::open_in_dir(dir).expect("open");
    let hits = reopened.search_keywords("rpm", Partition::documents(Corpus::IssueReport), 3).expect("search");
    assert_eq!(hits.len(), 1);
}

#[test]
fn open_or_create_keeps_existing_documents() {
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let dir = tmp.path().join("kw");
    let first = KeywordIndex::open_or_create_in_dir(dir.clone()).expect("create");
    first
        .index_items(&parse_guide("issue_report:issues/rotor.md", Corpus::IssueReport, "rotor", ISSUE))
        .expect("index");
    drop(first);

    let again = KeywordIndex::open_or_create_in_dir(dir).expect("reopen");
    again
        .index_items(&parse_guide("protocol_guide:centrifuge.md", Corpus::ProtocolGuide, "centrifuge", CENTRIFUGE))
        .expect("index");
    let issues = again.search_keywords("E-1042", Partition::documents(Corpus::IssueReport), 5).expect("search");
    assert_eq!(issues.len(), 1);
    let sections = again.search_keywords("E-1042", Partition::sections(Corpus::ProtocolGuide), 5).expect("search");
    assert_eq!(sections[0].id, "protocol_guide:centrifuge.md#2");
}
