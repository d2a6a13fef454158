// Copyright (c) 2025 - Cowboy AI, Inc.

//! Content parser interface and registry
//!
//! Parsers turn a downloaded file into ordered content chunks. Concrete
//! parsers for binary formats (PDF, audio, ...) are external collaborators;
//! the core ships a text parser and dispatches by file extension through an
//! explicit registry populated at startup. A file with no registered parser
//! keeps its File row and simply produces no chunks.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::errors::{PlatformError, PlatformResult};

/// One parsed content chunk
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub chunk_type: String,
    /// Zero-based position within the source file
    pub ordinal: u32,
    pub metadata: Map<String, Value>,
}

/// A content parser for one or more file extensions
#[async_trait]
pub trait Parser: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions without the dot, e.g. `["txt", "md"]`
    fn supported_extensions(&self) -> &[&'static str];

    /// Parse a local file into ordered chunks
    async fn parse(&self, path: &Path) -> PlatformResult<Vec<Chunk>>;
}

/// Extension-keyed parser registry
#[derive(Default)]
pub struct ParserRegistry {
    parsers: DashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in text parser installed
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(TextParser::default()));
        registry
    }

    pub fn register(&self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.parsers.insert(ext.to_string(), parser.clone());
        }
    }

    /// Parser for a path's extension, if one is registered
    pub fn get_parser(&self, path: &Path) -> Option<Arc<dyn Parser>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.parsers.get(&ext).map(|p| p.clone())
    }
}

/// Plain-text and markdown parser
///
/// Chunks on paragraph boundaries into windows of roughly
/// [`TextParser::TARGET_WORDS`] words.
pub struct TextParser {
    target_words: usize,
}

impl TextParser {
    pub const TARGET_WORDS: usize = 500;

    pub fn new(target_words: usize) -> Self {
        Self { target_words }
    }

    fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_words = 0usize;

        for paragraph in text.split("\n\n") {
            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            let words = trimmed.split_whitespace().count();

            if current_words > 0 && current_words + words > self.target_words {
                chunks.push(std::mem::take(&mut current));
                current_words = 0;
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
            current_words += words;
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

impl Default for TextParser {
    fn default() -> Self {
        Self::new(Self::TARGET_WORDS)
    }
}

#[async_trait]
impl Parser for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["txt", "md", "rst", "log", "csv"]
    }

    async fn parse(&self, path: &Path) -> PlatformResult<Vec<Chunk>> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            PlatformError::ParserFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let chunks = self
            .chunk_text(&text)
            .into_iter()
            .enumerate()
            .map(|(i, content)| {
                let mut metadata = Map::new();
                metadata.insert(
                    "method".into(),
                    Value::String(format!("word_window_{}", self.target_words)),
                );
                Chunk {
                    content,
                    chunk_type: "text".into(),
                    ordinal: i as u32,
                    metadata,
                }
            })
            .collect();

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chunking_respects_paragraphs() {
        let parser = TextParser::new(10);
        let text = "one two three four five\n\nsix seven eight nine ten\n\neleven twelve";
        let chunks = parser.chunk_text(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("one two"));
        assert!(chunks[1].contains("eleven"));
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let parser = TextParser::default();
        assert!(parser.chunk_text("").is_empty());
        assert!(parser.chunk_text("\n\n\n").is_empty());
    }

    #[tokio::test]
    async fn test_parse_file_ordinals() {
        let parser = TextParser::new(5);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "alpha beta gamma delta epsilon\n\nzeta eta theta iota kappa").unwrap();

        let chunks = parser.parse(file.path()).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[1].ordinal, 1);
        assert_eq!(chunks[0].chunk_type, "text");
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = ParserRegistry::with_defaults();
        assert!(registry.get_parser(Path::new("/tmp/a.txt")).is_some());
        assert!(registry.get_parser(Path::new("/tmp/a.MD")).is_some());
        assert!(registry.get_parser(Path::new("/tmp/a.pdf")).is_none());
        assert!(registry.get_parser(Path::new("/tmp/noext")).is_none());
    }
}
