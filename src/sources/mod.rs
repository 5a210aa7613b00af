//! Source material fed into selection: project files with their routing
//! tags, and the candidates that filtering stages produce over them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tokens::TokenCounter;

/// How a file entered the working set, and therefore how it is routed.
///
/// `Rest`, `Rag` and `Search` files were fetched on purpose by an
/// external collector and bypass relevance filtering entirely. `Indexed`
/// files come from project discovery and go through the full pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Rest,
    Rag,
    Search,
    #[default]
    Indexed,
}

impl SourceTag {
    pub fn bypasses_filtering(&self) -> bool {
        !matches!(self, SourceTag::Indexed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub tag: SourceTag,
    /// Cached token count; 0 means "not yet counted".
    #[serde(default)]
    pub tokens: usize,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            tag: SourceTag::default(),
            tokens: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: SourceTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens = tokens;
        self
    }

    /// The cached count when present, otherwise a fresh count.
    pub fn tokens_or_count(&self, counter: &dyn TokenCounter) -> usize {
        if self.tokens > 0 {
            self.tokens
        } else {
            counter.count(&self.content)
        }
    }
}

/// A file proposed by some filtering stage, with the stage's reason and
/// an optional relevance score once verification has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub path: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

impl Candidate {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: i32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Oracles sometimes echo paths back with the `##` digest prefix still
/// attached; all accumulator keys go through this.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    trimmed.strip_prefix("##").unwrap_or(trimmed).to_string()
}
