//! Turns a directory of markdown/text guides into corpus items.
//!
//! Each file yields one whole-document item (`heading_level == 0`) plus one
//! item per markdown heading. Vectors are left empty for the refresh pipeline.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{Corpus, CorpusItem, Partition};

const GUIDE_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Subdirectory whose files belong to the issue-report corpus.
pub const ISSUES_DIR: &str = "issues";

#[derive(Debug, Clone, Default)]
pub struct GuideProcessor;

impl GuideProcessor {
    pub fn new() -> Self { Self }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<CorpusItem>> {
        self.process_files(data_dir, self.list_guide_files(data_dir))
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<CorpusItem>> {
        let mut files = self.list_guide_files(data_dir);
        if files.len() > limit {
            files.truncate(limit);
            info!(limit, "limited guide ingestion");
        }
        self.process_files(data_dir, files)
    }

    fn process_files(&self, data_dir: &Path, files: Vec<PathBuf>) -> Result<Vec<CorpusItem>> {
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no guide files found");
            return Ok(vec![]);
        }
        let mut items = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), n = file_index + 1, of = files.len(), "processing guide");
            let text = self.read_file_content(file_path)?;
            let relative = file_path.strip_prefix(data_dir).unwrap_or(file_path);
            let corpus = corpus_for_path(relative);
            let stem = file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let doc_id = format!("{}:{}", corpus.as_str(), relative.to_string_lossy().replace('\\', "/"));
            items.extend(parse_guide(&doc_id, corpus, &stem, &text));
        }
        info!(files = files.len(), items = items.len(), "processed guides");
        Ok(items)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn list_guide_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            let is_guide = path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| GUIDE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_guide { files.push(path.to_path_buf()); }
        }
        files.sort();
        files
    }
}

fn corpus_for_path(relative: &Path) -> Corpus {
    match relative.components().next() {
        Some(first) if relative.components().count() > 1 && first.as_os_str() == ISSUES_DIR => Corpus::IssueReport,
        _ => Corpus::ProtocolGuide,
    }
}

/// Split one guide into its document item followed by its section items.
pub fn parse_guide(doc_id: &str, corpus: Corpus, fallback_title: &str, text: &str) -> Vec<CorpusItem> {
    let mut sections: Vec<(u8, String, Vec<&str>)> = Vec::new();
    let mut doc_title: Option<String> = None;

    for line in text.lines() {
        if let Some((level, heading)) = parse_heading(line) {
            if doc_title.is_none() && level == 1 {
                doc_title = Some(heading.clone());
            }
            sections.push((level, heading, Vec::new()));
        } else if let Some((_, _, body)) = sections.last_mut() {
            body.push(line);
        }
    }

    let title = doc_title
        .or_else(|| sections.first().map(|(_, h, _)| h.clone()))
        .unwrap_or_else(|| fallback_title.to_string());

    let mut items = vec![CorpusItem {
        id: doc_id.to_string(),
        partition: Partition::documents(corpus),
        title,
        content: text.trim().to_string(),
        heading_level: 0,
        parent_document_id: None,
        title_vector: None,
        content_vector: None,
    }];

    let mut ordinal = 0usize;
    for (level, heading, body) in sections {
        let content = body.join("\n").trim().to_string();
        if content.is_empty() { continue; }
        ordinal += 1;
        items.push(CorpusItem {
            id: format!("{doc_id}#{ordinal}"),
            partition: Partition::sections(corpus),
            title: heading,
            content,
            heading_level: level,
            parent_document_id: Some(doc_id.to_string()),
            title_vector: None,
            content_vector: None,
        });
    }
    items
}

fn parse_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 { return None; }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(char::is_whitespace) { return None; }
    let heading = rest.trim().trim_end_matches('#').trim();
    if heading.is_empty() { return None; }
    Some((hashes as u8, heading.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_requires_space_after_hashes() {
        assert_eq!(parse_heading("## Setup"), Some((2, "Setup".to_string())));
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("####### too deep"), None);
        assert_eq!(parse_heading("# Closed #"), Some((1, "Closed".to_string())));
    }

    #[test]
    fn issues_subdirectory_maps_to_issue_corpus() {
        assert_eq!(corpus_for_path(Path::new("issues/pump.md")), Corpus::IssueReport);
        assert_eq!(corpus_for_path(Path::new("issues.md")), Corpus::ProtocolGuide);
        assert_eq!(corpus_for_path(Path::new("lab/pcr.md")), Corpus::ProtocolGuide);
    }
}
