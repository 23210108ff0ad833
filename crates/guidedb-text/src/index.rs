use anyhow::Result;
use std::path::PathBuf;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::{Token, TokenStream};
use tantivy::{doc, Index, IndexReader, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use guidedb_core::traits::KeywordSearcher;
use guidedb_core::types::{CorpusItem, KeywordHit, Partition};
use guidedb_core::Error;

use crate::tantivy_utils::{build_schema, register_tokenizer};

const TITLE_BOOST: f32 = 2.0;
const PHRASE_BOOST: f32 = 3.0;
const WRITER_HEAP: usize = 50_000_000;

#[derive(Clone, Copy)]
struct Fields { id: Field, partition: Field, title: Field, content: Field }

pub struct KeywordIndex { index: Index, reader: IndexReader, fields: Fields }

impl KeywordIndex {
	/// Fresh index in `index_dir`, replacing whatever was there.
	pub fn create_in_dir(index_dir: PathBuf) -> Result<Self> {
		if index_dir.exists() { std::fs::remove_dir_all(&index_dir)?; }
		std::fs::create_dir_all(&index_dir)?;
		Self::from_index(Index::create_in_dir(&index_dir, build_schema())?)
	}

	pub fn open_in_dir(index_dir: PathBuf) -> Result<Self> {
		Self::from_index(Index::open_in_dir(&index_dir)?)
	}

	/// Existing index in `index_dir`, or a new empty one.
	pub fn open_or_create_in_dir(index_dir: PathBuf) -> Result<Self> {
		if index_dir.join("meta.json").exists() { return Self::open_in_dir(index_dir); }
		std::fs::create_dir_all(&index_dir)?;
		Self::from_index(Index::create_in_dir(&index_dir, build_schema())?)
	}

	pub fn create_in_ram() -> Result<Self> {
		Self::from_index(Index::create_in_ram(build_schema()))
	}

	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let schema = index.schema();
		let fields = Fields {
			id: schema.get_field("id")?,
			partition: schema.get_field("partition")?,
			title: schema.get_field("title")?,
			content: schema.get_field("content")?,
		};
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, fields })
	}

	/// Add or replace items by id.
	pub fn index_items(&self, items: &[CorpusItem]) -> Result<usize> {
		let mut index_writer = self.index.writer(WRITER_HEAP)?;
		let f = self.fields;
		for item in items {
			index_writer.delete_term(Term::from_field_text(f.id, &item.id));
			index_writer.add_document(doc!(
				f.id => item.id.clone(),
				f.partition => item.partition.as_str(),
				f.title => item.title.clone(),
				f.content => item.content.clone(),
			))?;
		}
		index_writer.commit()?;
		self.reader.reload()?;
		debug!(items = items.len(), "keyword index committed");
		Ok(items.len())
	}

	/// Analyze `text` with the field's tokenizer (lower-casing, stop words).
	fn tokens(&self, field: Field, text: &str) -> Result<Vec<String>> {
		let mut analyzer = self.index.tokenizer_for_field(field)?;
		let mut stream = analyzer.token_stream(text);
		let mut tokens = Vec::new();
		stream.process(&mut |token: &Token| tokens.push(token.text.clone()));
		Ok(tokens)
	}

	/// Disjunction of every query term over title (boosted) and content, plus a
	/// phrase clause per quoted segment. Built from analyzed terms so that
	/// error strings and product codes never hit query-syntax errors.
	fn build_query(&self, query: &str) -> Result<Option<Box<dyn Query>>> {
		let f = self.fields;
		let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
		for token in self.tokens(f.content, query)? {
			let content_term = Term::from_field_text(f.content, &token);
			let title_term = Term::from_field_text(f.title, &token);
			clauses.push((Occur::Should, Box::new(TermQuery::new(content_term, IndexRecordOption::WithFreqs))));
			clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(TermQuery::new(title_term, IndexRecordOption::WithFreqs)), TITLE_BOOST))));
		}
		if clauses.is_empty() { return Ok(None); }
		for phrase in quoted_segments(query) {
			let terms: Vec<Term> = self.tokens(f.content, phrase)?.iter().map(|t| Term::from_field_text(f.content, t)).collect();
			if terms.len() > 1 {
				clauses.push((Occur::Should, Box::new(BoostQuery::new(Box::new(PhraseQuery::new(terms)), PHRASE_BOOST))));
			}
		}
		Ok(Some(Box::new(BooleanQuery::new(clauses))))
	}

	fn search(&self, query: &str, partition: Partition, limit: usize) -> Result<Vec<KeywordHit>> {
		if limit == 0 { return Ok(vec![]); }
		let Some(text_query) = self.build_query(query)? else { return Ok(vec![]); };
		let partition_query = TermQuery::new(Term::from_field_text(self.fields.partition, partition.as_str()), IndexRecordOption::Basic);
		let query = BooleanQuery::new(vec![
			(Occur::Must, text_query),
			(Occur::Must, Box::new(BoostQuery::new(Box::new(partition_query), 0.0))),
		]);
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;
		let best = top_docs.first().map(|(score, _)| *score).unwrap_or(0.0);
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let id = doc.get_first(self.fields.id).and_then(|v| v.as_str()).unwrap_or("").to_string();
			let normalized = if best > 0.0 { f64::from(score / best) } else { 0.0 };
			hits.push(KeywordHit { id, score: normalized });
		}
		Ok(hits)
	}
}

impl KeywordSearcher for KeywordIndex {
	fn search_keywords(&self, query: &str, partition: Partition, limit: usize) -> guidedb_core::Result<Vec<KeywordHit>> {
		self.search(query, partition, limit).map_err(|e| Error::Operation(format!("keyword search: {e}")))
	}
}

/// Text between pairs of double quotes.
fn quoted_segments(query: &str) -> impl Iterator<Item = &str> {
	query.split('"').skip(1).step_by(2).filter(|s| !s.trim().is_empty())
}
