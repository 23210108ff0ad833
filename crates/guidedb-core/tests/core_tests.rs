use std::fs;
use tempfile::TempDir;

use guidedb_core::config::{expand_path, resolve_with_base, Config};
use guidedb_core::processor::GuideProcessor;
use guidedb_core::types::{Corpus, Granularity, Partition};
use guidedb_core::Error;

const PCR_GUIDE: &str = "# PCR Protocol\n\nIntro paragraph.\n\n## Reagents\n\nPrimers and buffer.\n\n## Cycling\n\n95C for 30s.\n\n### Troubleshooting\n\nNo bands: check Mg2+.\n";

#[test]
fn process_directory_single_guide() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("pcr.md"), PCR_GUIDE).unwrap();

    let items = GuideProcessor::new().process_directory(tmp.path()).expect("process");

    // One document entry + "PCR Protocol", "Reagents", "Cycling", "Troubleshooting"
    assert_eq!(items.len(), 5);
    let doc = &items[0];
    assert!(doc.is_document());
    assert_eq!(doc.title, "PCR Protocol");
    assert_eq!(doc.id, "protocol_guide:pcr.md");
    assert_eq!(doc.source_table(), "protocol_guide");

    let sections = &items[1..];
    assert!(sections.iter().all(|s| s.heading_level >= 1));
    assert!(sections.iter().all(|s| s.parent_document_id.as_deref() == Some("protocol_guide:pcr.md")));
    assert!(sections.iter().all(|s| s.source_table() == "protocol_guide_section"));
    assert!(sections.iter().all(|s| !s.has_vectors()));
    let troubleshooting = sections.iter().find(|s| s.title == "Troubleshooting").unwrap();
    assert_eq!(troubleshooting.heading_level, 3);
    assert_eq!(troubleshooting.content, "No bands: check Mg2+.");
}

#[test]
fn issue_reports_land_in_their_own_corpus() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("issues")).unwrap();
    fs::write(tmp.path().join("issues/centrifuge.md"), "# Centrifuge E-17\n\n## Symptom\n\nRotor imbalance.\n").unwrap();

    let items = GuideProcessor::new().process_directory(tmp.path()).expect("process");

    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.partition.corpus == Corpus::IssueReport));
    assert_eq!(items[1].source_table(), "issue_report_section");
}

#[test]
fn untitled_text_file_uses_file_stem() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("notes.txt"), "just some text").unwrap();

    let items = GuideProcessor::new().process_directory(tmp.path()).expect("process");

    assert_eq!(items.len(), 1, "no headings means no sections");
    assert_eq!(items[0].title, "notes");
}

#[test]
fn process_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.md"), "# A\n\nalpha bravo").unwrap();
    fs::write(tmp.path().join("b.md"), "# B\n\ncharlie delta").unwrap();

    let items = GuideProcessor::new().process_directory_limited(tmp.path(), 1).expect("process limited");

    let docs: Vec<_> = items.iter().filter(|i| i.is_document()).collect();
    assert_eq!(docs.len(), 1, "limited to one source document");
}

#[test]
fn partition_tags_round_trip() {
    for p in Partition::ALL {
        assert_eq!(Partition::parse(p.as_str()), Some(p));
    }
    assert_eq!(Partition::parse("protocol_guide_section").map(|p| p.granularity), Some(Granularity::Section));
    assert_eq!(Partition::parse("guides; DROP TABLE x"), None);
}

#[test]
fn config_from_toml_reads_typed_sections() {
    let config = Config::from_toml_str("[embedding]\ndimension = 768\nuse_fake = true\n[data]\ntable = \"items\"\n");
    let embedding = config.embedding().unwrap();
    assert_eq!(embedding.dimension, 768);
    assert!(embedding.use_fake);
    assert_eq!(config.data().unwrap().table, "items");
    assert_eq!(config.get_opt::<f64>("retrieval.rrf_k").unwrap(), None);
}

#[test]
fn relative_paths_resolve_against_base() {
    let base = std::path::Path::new("/srv/guidedb");
    assert_eq!(resolve_with_base(base, "indexes/lancedb"), base.join("indexes/lancedb"));
    assert_eq!(resolve_with_base(base, "/abs/path"), std::path::PathBuf::from("/abs/path"));
    assert!(expand_path("plain/path").ends_with("plain/path"));
}

#[test]
fn error_recoverability_follows_taxonomy() {
    assert!(Error::Embed("timeout".into()).is_recoverable());
    assert!(Error::VectorStore("down".into()).is_recoverable());
    assert!(Error::DimensionMismatch { expected: 1024, actual: 768 }.is_fatal());
    assert!(Error::InvalidConfiguration("x".into()).is_fatal());
}
