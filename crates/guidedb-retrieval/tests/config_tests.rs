use guidedb_core::config::Config;
use guidedb_core::types::Corpus;
use guidedb_core::Error;
use guidedb_retrieval::{AssistantSettings, EngineSettings, ThresholdStore, WeightPair, WeightSettings};

const TOML: &str = r#"
[retrieval]
candidate_pool = 20
min_sufficient_matches = 3

[assistants.protocol_assistant]
master_threshold = 0.75
corpus = "protocol_guide"

[assistants.rvt_assistant]
master_threshold = 0.6
corpus = "issue_report"
stage1_weights = { title = 0.8, content = 0.2 }
stage2_weights = { title = 0.4, content = 0.6 }
"#;

#[test]
fn settings_load_from_toml() {
    let settings = EngineSettings::from_config(&Config::from_toml_str(TOML)).unwrap();
    assert_eq!(settings.retrieval.candidate_pool, 20);
    assert_eq!(settings.retrieval.min_sufficient_matches, 3);
    assert_eq!(settings.retrieval.rrf_k, 60.0);
    assert_eq!(settings.retrieval.snippet_chars, 300);

    let store = ThresholdStore::new(&settings).unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.assistant_types().collect::<Vec<_>>(), vec!["protocol_assistant", "rvt_assistant"]);

    let rvt = snapshot.assistant("rvt_assistant").unwrap();
    assert_eq!(rvt.corpus, Corpus::IssueReport);
    assert_eq!(rvt.thresholds.stage1_weights, WeightPair::new(0.8, 0.2).unwrap());
    assert!((rvt.thresholds.keyword_threshold - 0.3).abs() < 1e-12);

    let protocol = store.resolve("protocol_assistant").unwrap();
    assert_eq!(protocol.stage1_weights, WeightPair::TITLE_HEAVY);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let settings = EngineSettings::from_config(&Config::from_toml_str("")).unwrap();
    assert!(settings.assistants.is_empty());
    let store = ThresholdStore::new(&settings).unwrap();
    assert!(matches!(store.resolve("protocol_assistant"), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn bad_weights_fail_at_load() {
    let toml = r#"
[assistants.protocol_assistant]
master_threshold = 0.75
corpus = "protocol_guide"
stage1_weights = { title = 0.9, content = 0.2 }
"#;
    let settings = EngineSettings::from_config(&Config::from_toml_str(toml)).unwrap();
    assert!(matches!(ThresholdStore::new(&settings), Err(Error::InvalidWeightConfiguration(_))));
}

#[test]
fn reload_swaps_atomically_and_rejects_invalid() {
    let settings = EngineSettings::default().with_assistant("protocol_assistant", AssistantSettings::new(0.75, Corpus::ProtocolGuide));
    let store = ThresholdStore::new(&settings).unwrap();
    let held = store.snapshot();

    let broken = EngineSettings::default().with_assistant("protocol_assistant", AssistantSettings::new(0.0, Corpus::ProtocolGuide));
    assert!(matches!(store.reload(&broken), Err(Error::InvalidConfiguration(_))));
    assert_eq!(store.version(), 1);
    assert_eq!(store.resolve("protocol_assistant").unwrap().master_threshold, 0.75);

    let mut inverted = AssistantSettings::new(0.7, Corpus::ProtocolGuide);
    inverted.stage2_weights = Some(WeightSettings { title: 0.9, content: 0.1 });
    let inverted = EngineSettings::default().with_assistant("protocol_assistant", inverted);
    assert!(store.reload(&inverted).is_err());

    let tuned = EngineSettings::default().with_assistant("protocol_assistant", AssistantSettings::new(0.6, Corpus::ProtocolGuide));
    let version = store.reload(&tuned).unwrap();
    assert!(version > held.version);
    assert_eq!(store.version(), version);
    assert_eq!(store.resolve("protocol_assistant").unwrap().master_threshold, 0.6);

    // A snapshot taken before the swap is unchanged.
    assert_eq!(held.resolve("protocol_assistant").unwrap().master_threshold, 0.75);
}

#[test]
fn retrieval_settings_are_validated() {
    let mut settings = EngineSettings::default();
    settings.retrieval.rrf_k = 0.0;
    assert!(matches!(ThresholdStore::new(&settings), Err(Error::InvalidConfiguration(_))));
    settings.retrieval.rrf_k = 60.0;
    settings.retrieval.candidate_pool = 0;
    assert!(matches!(ThresholdStore::new(&settings), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn concurrent_reloads_leave_the_newest_version_active() {
    let store = ThresholdStore::new(&EngineSettings::default()).unwrap();
    let accepted: Vec<(u64, f64)> = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut last = 0;
            for _ in 0..2_000 {
                let seen = store.version();
                assert!(seen >= last, "version went back from {last} to {seen}");
                last = seen;
            }
        });
        let writers: Vec<_> = (0..8)
            .map(|worker| {
                let store = &store;
                scope.spawn(move || {
                    (0..25)
                        .map(|round| {
                            let master = 0.5 + f64::from(worker * 25 + round) / 1_000.0;
                            let settings = EngineSettings::default()
                                .with_assistant("protocol_assistant", AssistantSettings::new(master, Corpus::ProtocolGuide));
                            (store.reload(&settings).unwrap(), master)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        reader.join().unwrap();
        writers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    let (newest, master) = accepted.iter().copied().max_by_key(|(version, _)| *version).unwrap();
    assert_eq!(newest, 201);
    assert_eq!(store.version(), newest);
    assert_eq!(store.resolve("protocol_assistant").unwrap().master_threshold, master);
}
