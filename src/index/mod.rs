//! Symbol/change index.
//!
//! Per-file metadata keyed by path: a symbol summary, a content hash and
//! the ingestion timestamp. Rebuilds are incremental — an entry is
//! refreshed only when its content hash changes — and the two query
//! operations (keyword ranking, related-file expansion) fail closed: any
//! oracle error yields an empty result, never a partial one, and is not
//! retried.

mod symbols;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::console::console;
use crate::oracle::RelevanceOracle;
use crate::sources::{Candidate, SourceFile, normalize_path};

pub use symbols::extract_symbols;

/// Suffixes the index refuses to summarize; prose does not rank well by
/// symbol digest and bloats every oracle batch.
const DOC_SUFFIXES: [&str; 5] = [".md", ".txt", ".html", ".doc", ".pdf"];

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: String,
    pub symbols: String,
    pub indexed_at: DateTime<Utc>,
    pub content_hash: String,
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_doc_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    DOC_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

pub struct SymbolIndex {
    oracle: Arc<dyn RelevanceOracle>,
    batch_size: usize,
    entries: IndexMap<String, IndexEntry>,
}

impl SymbolIndex {
    pub fn new(oracle: Arc<dyn RelevanceOracle>, batch_size: usize) -> Self {
        Self {
            oracle,
            batch_size: batch_size.max(1),
            entries: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn entries(&self) -> &IndexMap<String, IndexEntry> {
        &self.entries
    }

    /// Build or refresh the index over `files`. Entries whose content
    /// hash is unchanged are kept as-is; changed or new files get a
    /// freshly extracted entry that replaces the stale one wholesale.
    /// Entries for paths no longer in `files` are dropped. Returns the
    /// number of rebuilt entries.
    pub fn build(&mut self, files: &[SourceFile]) -> usize {
        let live: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        self.entries.retain(|path, _| live.contains(path.as_str()));

        let mut rebuilt = 0;
        for file in files {
            if file.content.trim().is_empty() || is_doc_path(&file.path) {
                continue;
            }
            let hash = content_hash(&file.content);
            if let Some(entry) = self.entries.get(&file.path)
                && entry.content_hash == hash
            {
                continue;
            }
            self.entries.insert(
                file.path.clone(),
                IndexEntry {
                    path: file.path.clone(),
                    symbols: symbols::extract_symbols(&file.content),
                    indexed_at: Utc::now(),
                    content_hash: hash,
                },
            );
            rebuilt += 1;
        }

        console().debug(&format!(
            "index: {} entries, {} rebuilt",
            self.entries.len(),
            rebuilt
        ));
        rebuilt
    }

    /// Render the index as `##<path>\n<symbols>` blocks, batched so each
    /// chunk stays a reasonable oracle payload.
    fn digest_chunks(&self) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut in_chunk = 0;

        for entry in self.entries.values() {
            current.push_str(&format!("##{}\n{}\n\n", entry.path, entry.symbols));
            in_chunk += 1;
            if in_chunk >= self.batch_size {
                chunks.push(std::mem::take(&mut current));
                in_chunk = 0;
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Level-1: rank indexed files against a free-text query. Fails
    /// closed — any chunk error discards the whole result.
    pub async fn query_by_keyword(&self, query: &str) -> Vec<Candidate> {
        let mut results: IndexMap<String, Candidate> = IndexMap::new();
        for chunk in self.digest_chunks() {
            match self.oracle.rank_by_query(&chunk, query).await {
                Ok(ranked) => {
                    for file in ranked {
                        let path = normalize_path(&file.file_path);
                        results.insert(path.clone(), Candidate::new(path, file.reason));
                    }
                }
                Err(error) => {
                    console().warning(&format!("Keyword ranking failed, no candidates: {}", error));
                    return Vec::new();
                }
            }
        }
        results.into_values().collect()
    }

    /// Level-2: expand an already-selected path set to the files they
    /// import or use. Same fail-closed contract as keyword ranking.
    pub async fn related_to(&self, paths: &[String]) -> Vec<Candidate> {
        let mut results: IndexMap<String, Candidate> = IndexMap::new();
        for chunk in self.digest_chunks() {
            match self.oracle.related_files(&chunk, paths).await {
                Ok(related) => {
                    for file in related {
                        let path = normalize_path(&file.file_path);
                        results.insert(path.clone(), Candidate::new(path, file.reason));
                    }
                }
                Err(error) => {
                    console().warning(&format!("Related-file expansion failed: {}", error));
                    return Vec::new();
                }
            }
        }
        results.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;

    fn files() -> Vec<SourceFile> {
        vec![
            SourceFile::new("src/auth.rs", "pub fn login() {}\n"),
            SourceFile::new("src/db.rs", "pub fn connect() {}\n"),
        ]
    }

    #[test]
    fn test_build_is_incremental() {
        let mut index = SymbolIndex::new(Arc::new(MockOracle::new()), 10);
        let mut set = files();

        assert_eq!(index.build(&set), 2);
        assert_eq!(index.build(&set), 0);

        set[0].content = "pub fn login() {}\npub fn logout() {}\n".to_string();
        assert_eq!(index.build(&set), 1);
        assert!(
            index
                .entry("src/auth.rs")
                .unwrap()
                .symbols
                .contains("logout")
        );
    }

    #[test]
    fn test_build_drops_vanished_paths() {
        let mut index = SymbolIndex::new(Arc::new(MockOracle::new()), 10);
        let set = files();
        index.build(&set);
        assert_eq!(index.len(), 2);

        index.build(&set[..1]);
        assert_eq!(index.len(), 1);
        assert!(index.entry("src/db.rs").is_none());
    }

    #[test]
    fn test_build_skips_empty_and_doc_files() {
        let mut index = SymbolIndex::new(Arc::new(MockOracle::new()), 10);
        let set = vec![
            SourceFile::new("README.md", "# readme\n"),
            SourceFile::new("empty.rs", "   \n"),
            SourceFile::new("src/lib.rs", "pub fn run() {}\n"),
        ];
        assert_eq!(index.build(&set), 1);
        assert!(index.entry("README.md").is_none());
        assert!(index.entry("empty.rs").is_none());
    }

    #[test]
    fn test_digest_chunks_respect_batch_size() {
        let mut index = SymbolIndex::new(Arc::new(MockOracle::new()), 1);
        index.build(&files());
        let chunks = index.digest_chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("##src/auth.rs\n"));
    }

    #[tokio::test]
    async fn test_query_fails_closed_to_empty() {
        let mut index = SymbolIndex::new(Arc::new(MockOracle::failing()), 10);
        index.build(&files());

        assert!(index.query_by_keyword("login").await.is_empty());
        assert!(index.related_to(&["src/auth.rs".to_string()]).await.is_empty());
    }

    #[tokio::test]
    async fn test_query_dedupes_and_normalizes_paths() {
        let oracle = MockOracle::new()
            .with_ranking("##src/auth.rs", "first reason")
            .with_ranking("src/auth.rs", "second reason");
        let mut index = SymbolIndex::new(Arc::new(oracle), 10);
        index.build(&files());

        let candidates = index.query_by_keyword("login").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "src/auth.rs");
        assert_eq!(candidates[0].reason, "second reason");
    }
}
