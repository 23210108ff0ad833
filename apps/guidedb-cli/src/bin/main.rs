use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use guidedb_core::config::{expand_path, Config};
use guidedb_core::processor::GuideProcessor;
use guidedb_core::traits::{KeywordSearcher, VectorWriter};
use guidedb_embed::get_default_embedder;
use guidedb_retrieval::{EngineSettings, KeywordMode, RetrievalEngine, RetrievalRequest, RetrievalResponse, ThresholdStore};
use guidedb_text::KeywordIndex;
use guidedb_vector::table::vector_status;
use guidedb_vector::{refresh_vectors, LanceCorpusStore, RefreshOptions};

const USAGE: &str = "Usage: guidedb <command> [args...]

Commands:
  ingest [guides_dir] [--limit N]          parse guides into LanceDB and the keyword index
  refresh [limit]                          compute missing or stale vectors
  query <assistant> <text> [top_k]         two-stage retrieval
        [--threshold X] [--keywords auto|always|never]
  documents <assistant> <text> [top_k]     whole-document listing
  resolve <assistant>                      print resolved thresholds";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// Split `--flag value` pairs out of `args`, leaving positionals in order.
fn take_flag(args: &mut Vec<String>, flag: &str) -> anyhow::Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == flag) else { return Ok(None) };
    if i + 1 >= args.len() { anyhow::bail!("{flag} requires a value"); }
    let value = args.remove(i + 1);
    args.remove(i);
    Ok(Some(value))
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).compact().init();
}

async fn open_store(config: &Config) -> anyhow::Result<LanceCorpusStore> {
    let data = config.data()?;
    let dim = config.embedding()?.dimension;
    let path = expand_path(&data.lancedb_dir);
    std::fs::create_dir_all(&path)?;
    LanceCorpusStore::open(&path, &data.table, dim).await
}

async fn ingest(config: &Config, mut args: Vec<String>) -> anyhow::Result<()> {
    let limit = take_flag(&mut args, "--limit")?.map(|v| v.parse::<usize>()).transpose()?;
    let data = config.data()?;
    let guides_dir = args.first().map(PathBuf::from).unwrap_or_else(|| expand_path(&data.guides_dir));
    println!("Ingesting guides from {}", guides_dir.display());

    let processor = GuideProcessor::new();
    let items = match limit {
        Some(limit) => processor.process_directory_limited(&guides_dir, limit)?,
        None => processor.process_directory(&guides_dir)?,
    };
    let store = open_store(config).await?;
    let upserted = store.upsert_items(&items).await?;

    // A full run mirrors the guides directory in both indexes; a limited run
    // only adds to them.
    let keyword_dir = expand_path(&data.keyword_index_dir);
    let keywords = match limit {
        Some(_) => KeywordIndex::open_or_create_in_dir(keyword_dir.clone())?,
        None => {
            let keep: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
            let removed = store.prune_items(&keep).await?;
            if !removed.is_empty() { println!("🗑️  Removed {} items no longer in {}", removed.len(), guides_dir.display()); }
            KeywordIndex::create_in_dir(keyword_dir.clone())?
        }
    };
    let indexed = keywords.index_items(&items)?;

    let (total, with_vectors) = vector_status(store.connection(), store.table_name()).await?;
    println!("✅ Upserted {upserted} items into LanceDB ({with_vectors}/{total} with vectors)");
    println!("📊 Indexed {indexed} items into {}", keyword_dir.display());
    println!("💡 Run `guidedb refresh` to compute missing vectors");
    Ok(())
}

async fn refresh(config: &Config, args: Vec<String>) -> anyhow::Result<()> {
    let limit = args.first().map(|v| v.parse::<usize>()).transpose()?;
    let store = open_store(config).await?;
    let embedder = get_default_embedder(&config.embedding()?)?;
    let options = RefreshOptions { limit, show_progress: true, ..RefreshOptions::default() };
    let report = refresh_vectors(&store, embedder.as_ref(), &options).await?;
    let (total, with_vectors) = vector_status(store.connection(), store.table_name()).await?;
    println!(
        "✅ Refresh done: scanned {}, embedded {}, failed {} ({with_vectors}/{total} items with vectors)",
        report.scanned, report.embedded, report.failed
    );
    Ok(())
}

async fn build_engine(config: &Config) -> anyhow::Result<RetrievalEngine> {
    let thresholds = Arc::new(ThresholdStore::new(&EngineSettings::from_config(config)?)?);
    let store = Arc::new(open_store(config).await?);
    let embedder = get_default_embedder(&config.embedding()?)?;
    let engine = RetrievalEngine::new(embedder, store.clone(), store, thresholds);
    let keyword_dir = expand_path(config.data()?.keyword_index_dir);
    if !keyword_dir.exists() {
        info!(dir = %keyword_dir.display(), "no keyword index, hybrid search disabled");
        return Ok(engine);
    }
    let keywords: Arc<dyn KeywordSearcher> = Arc::new(KeywordIndex::open_in_dir(keyword_dir)?);
    Ok(engine.with_keyword_searcher(keywords))
}

fn parse_keyword_mode(value: &str) -> anyhow::Result<KeywordMode> {
    match value {
        "auto" => Ok(KeywordMode::Auto),
        "always" => Ok(KeywordMode::Always),
        "never" => Ok(KeywordMode::Never),
        other => anyhow::bail!("unknown keyword mode '{other}' (auto|always|never)"),
    }
}

fn print_response(response: &RetrievalResponse) {
    println!("stage: {}  degraded: {}  config v{}", response.stage.as_str(), response.degraded, response.config_version);
    if response.hits.is_empty() { println!("(no matches)"); }
    for (rank, hit) in response.hits.iter().enumerate() {
        let rrf = hit.rrf_score.map(|s| format!("  rrf {s:.4}")).unwrap_or_default();
        println!("{:>2}. [{:.4}{rrf}] {}  ({})", rank + 1, hit.score, hit.title, hit.id);
        println!("    {}", hit.content_snippet.replace('\n', " "));
    }
}

async fn query(config: &Config, mut args: Vec<String>) -> anyhow::Result<()> {
    let threshold = take_flag(&mut args, "--threshold")?.map(|v| v.parse::<f64>()).transpose()?;
    let mode = take_flag(&mut args, "--keywords")?.map(|v| parse_keyword_mode(&v)).transpose()?.unwrap_or_default();
    let [assistant, text, rest @ ..] = args.as_slice() else {
        anyhow::bail!("Usage: guidedb query <assistant> \"<text>\" [top_k] [--threshold X] [--keywords auto|always|never]");
    };
    let top_k = rest.first().map(|v| v.parse::<usize>()).transpose()?.unwrap_or(5);

    let engine = build_engine(config).await?;
    let mut request = RetrievalRequest::new(text.as_str(), assistant.as_str(), top_k).with_keyword_mode(mode);
    if let Some(threshold) = threshold { request = request.with_score_threshold(threshold); }
    let response = engine.retrieve(&request).await?;
    print_response(&response);
    Ok(())
}

async fn documents(config: &Config, args: Vec<String>) -> anyhow::Result<()> {
    let [assistant, text, rest @ ..] = args.as_slice() else {
        anyhow::bail!("Usage: guidedb documents <assistant> \"<text>\" [top_k]");
    };
    let top_k = rest.first().map(|v| v.parse::<usize>()).transpose()?.unwrap_or(5);
    let engine = build_engine(config).await?;
    let response = engine.search_documents(text, assistant, top_k).await?;
    print_response(&response);
    Ok(())
}

fn resolve(config: &Config, args: Vec<String>) -> anyhow::Result<()> {
    let Some(assistant) = args.first() else { anyhow::bail!("Usage: guidedb resolve <assistant>") };
    let store = ThresholdStore::new(&EngineSettings::from_config(config)?)?;
    let snapshot = store.snapshot();
    let profile = snapshot.assistant(assistant)?;
    let t = &profile.thresholds;
    println!("assistant:          {}", t.assistant_type);
    println!("corpus:             {}", profile.corpus);
    println!("master_threshold:   {:.4}", t.master_threshold);
    println!("stage1_threshold:   {:.4}", t.stage1_threshold);
    println!("stage2_threshold:   {:.4}", t.stage2_threshold);
    println!("document_threshold: {:.4}", t.document_threshold);
    println!("keyword_threshold:  {:.4}", t.keyword_threshold);
    println!("stage1_weights:     title {:.2} / content {:.2}", t.stage1_weights.title_weight(), t.stage1_weights.content_weight());
    println!("stage2_weights:     title {:.2} / content {:.2}", t.stage2_weights.title_weight(), t.stage2_weights.content_weight());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => ingest(&config, args).await,
        "refresh" => refresh(&config, args).await,
        "query" => query(&config, args).await,
        "documents" => documents(&config, args).await,
        "resolve" => resolve(&config, args),
        _ => { eprintln!("Unknown command: {cmd}\n\n{USAGE}"); std::process::exit(1); }
    }
}
