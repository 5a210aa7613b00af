//! The relevance oracle.
//!
//! Everything that needs a judgement call — "which files matter for this
//! query", "how relevant is this content", "compress this without losing
//! the point" — goes through the [`RelevanceOracle`] trait. In production
//! that is an LLM call; in tests it is a deterministic stub. The oracle
//! is fallible and non-deterministic by nature, so every caller in this
//! crate has a degraded path for when it errors.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A file the oracle considers relevant, with its stated reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFile {
    pub file_path: String,
    pub reason: String,
}

/// A relevance score on the oracle's 0-10 scale plus a short reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceJudgement {
    pub score: i32,
    pub reason: String,
}

/// Pluggable relevance judge.
///
/// All methods are side-effect-free from this subsystem's point of view.
/// Errors are expected operating conditions, not bugs: an unreachable
/// model, a quota limit, a malformed response.
#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    /// Rank the files described by `index_digest` against a free-text
    /// query. The digest is a `##<path>\n<symbols>` rendering of the
    /// symbol index, one batch at a time.
    async fn rank_by_query(&self, index_digest: &str, query: &str) -> Result<Vec<RankedFile>>;

    /// Infer files related to an already-selected set through import and
    /// usage relationships visible in the digest.
    async fn related_files(&self, index_digest: &str, paths: &[String]) -> Result<Vec<RankedFile>>;

    /// Score a single file's content against the query.
    async fn score_file(&self, content: &str, query: &str) -> Result<RelevanceJudgement>;

    /// Score a conversation unit's rendered text against the query.
    async fn score_message(&self, content: &str, query: &str) -> Result<RelevanceJudgement>;

    /// Produce a query-focused excerpt of oversized content. The caller
    /// enforces the token bound; the oracle aims for it.
    async fn excerpt(&self, content: &str, query: &str) -> Result<String>;

    fn oracle_name(&self) -> &'static str;
}

pub mod mock;

pub use mock::MockOracle;
