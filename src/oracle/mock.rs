use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::{RankedFile, RelevanceJudgement, RelevanceOracle};

/// Deterministic oracle stub for tests.
///
/// Scores are resolved by substring needles against the content, so test
/// fixtures can steer verdicts by embedding markers in file or message
/// bodies. Rankings and expansions are canned. `failing()` makes every
/// call error, which is how the degraded paths get exercised.
pub struct MockOracle {
    default_score: i32,
    needle_scores: Vec<(String, i32)>,
    rankings: Vec<RankedFile>,
    expansions: Vec<RankedFile>,
    excerpt_text: Option<String>,
    fail_all: bool,
    score_calls: AtomicUsize,
    rank_calls: AtomicUsize,
    excerpt_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            default_score: 8,
            needle_scores: Vec::new(),
            rankings: Vec::new(),
            expansions: Vec::new(),
            excerpt_text: None,
            fail_all: false,
            score_calls: AtomicUsize::new(0),
            rank_calls: AtomicUsize::new(0),
            excerpt_calls: AtomicUsize::new(0),
        }
    }

    /// An oracle whose every call fails, as if the model were unreachable.
    pub fn failing() -> Self {
        let mut oracle = Self::new();
        oracle.fail_all = true;
        oracle
    }

    pub fn with_default_score(mut self, score: i32) -> Self {
        self.default_score = score;
        self
    }

    /// Content containing `needle` scores `score` instead of the default.
    pub fn with_needle_score(mut self, needle: impl Into<String>, score: i32) -> Self {
        self.needle_scores.push((needle.into(), score));
        self
    }

    pub fn with_ranking(mut self, file_path: impl Into<String>, reason: impl Into<String>) -> Self {
        self.rankings.push(RankedFile {
            file_path: file_path.into(),
            reason: reason.into(),
        });
        self
    }

    pub fn with_expansion(
        mut self,
        file_path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        self.expansions.push(RankedFile {
            file_path: file_path.into(),
            reason: reason.into(),
        });
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt_text = Some(excerpt.into());
        self
    }

    pub fn score_call_count(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn rank_call_count(&self) -> usize {
        self.rank_calls.load(Ordering::SeqCst)
    }

    pub fn excerpt_call_count(&self) -> usize {
        self.excerpt_calls.load(Ordering::SeqCst)
    }

    fn judge(&self, content: &str) -> RelevanceJudgement {
        for (needle, score) in &self.needle_scores {
            if content.contains(needle.as_str()) {
                return RelevanceJudgement {
                    score: *score,
                    reason: format!("matched '{}'", needle),
                };
            }
        }
        RelevanceJudgement {
            score: self.default_score,
            reason: "default mock score".to_string(),
        }
    }

    fn maybe_fail(&self) -> Result<()> {
        if self.fail_all {
            Err(anyhow!("mock oracle unreachable"))
        } else {
            Ok(())
        }
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelevanceOracle for MockOracle {
    async fn rank_by_query(&self, _index_digest: &str, _query: &str) -> Result<Vec<RankedFile>> {
        self.rank_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.rankings.clone())
    }

    async fn related_files(
        &self,
        _index_digest: &str,
        _paths: &[String],
    ) -> Result<Vec<RankedFile>> {
        self.maybe_fail()?;
        Ok(self.expansions.clone())
    }

    async fn score_file(&self, content: &str, _query: &str) -> Result<RelevanceJudgement> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.judge(content))
    }

    async fn score_message(&self, content: &str, _query: &str) -> Result<RelevanceJudgement> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.judge(content))
    }

    async fn excerpt(&self, content: &str, _query: &str) -> Result<String> {
        self.excerpt_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if let Some(text) = &self.excerpt_text {
            return Ok(text.clone());
        }
        // Default to the first line, which is always shorter than a
        // multi-line input.
        Ok(content.lines().next().unwrap_or("").to_string())
    }

    fn oracle_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_needle_scores_override_default() {
        let oracle = MockOracle::new()
            .with_default_score(2)
            .with_needle_score("login", 9);

        let hit = oracle.score_file("fn login() {}", "auth").await.unwrap();
        assert_eq!(hit.score, 9);

        let miss = oracle.score_file("fn render() {}", "auth").await.unwrap();
        assert_eq!(miss.score, 2);
    }

    #[tokio::test]
    async fn test_failing_oracle_errors_everywhere() {
        let oracle = MockOracle::failing();
        assert!(oracle.rank_by_query("", "q").await.is_err());
        assert!(oracle.related_files("", &[]).await.is_err());
        assert!(oracle.score_file("x", "q").await.is_err());
        assert!(oracle.excerpt("x", "q").await.is_err());
    }

    #[tokio::test]
    async fn test_call_counters() {
        let oracle = MockOracle::new();
        let _ = oracle.score_file("a", "q").await;
        let _ = oracle.score_message("b", "q").await;
        let _ = oracle.rank_by_query("", "q").await;
        assert_eq!(oracle.score_call_count(), 2);
        assert_eq!(oracle.rank_call_count(), 1);
    }
}
