use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use futures::stream::{self, StreamExt};

use crate::console::console;
use crate::oracle::RelevanceOracle;
use crate::sources::{Candidate, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictStatus {
    Pass,
    Fail,
    Error,
}

/// One verification outcome. Produced once per candidate per run and
/// handed back to the caller for reporting; never persisted.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub path: String,
    pub score: Option<i32>,
    pub status: VerdictStatus,
    pub reason: String,
}

/// Confirms candidate relevance with one oracle call per file, fanned
/// out over a bounded pool and collected behind a join barrier. One bad
/// file never aborts the batch.
pub struct RelevanceVerifier {
    oracle: Arc<dyn RelevanceOracle>,
    pass_threshold: i32,
    min_workers: usize,
}

impl RelevanceVerifier {
    pub fn new(oracle: Arc<dyn RelevanceOracle>, pass_threshold: i32, min_workers: usize) -> Self {
        Self {
            oracle,
            pass_threshold,
            min_workers,
        }
    }

    /// Half the machine, but never below the configured floor.
    pub fn pool_width(&self) -> usize {
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        (available / 2).max(self.min_workers).max(1)
    }

    /// Verify every candidate against `query`. Verdicts come back in
    /// completion order; the caller only sees them after every task has
    /// finished. Candidates without backing source content are dropped
    /// without a verdict — oracles occasionally invent paths.
    pub async fn verify(
        &self,
        candidates: &[Candidate],
        sources: &HashMap<&str, &SourceFile>,
        query: &str,
    ) -> Vec<Verdict> {
        let width = self.pool_width();
        console().debug(&format!(
            "verifying {} candidates across {} workers",
            candidates.len(),
            width
        ));

        let verdicts: Vec<Option<Verdict>> = stream::iter(candidates.iter().map(|candidate| {
            let oracle = Arc::clone(&self.oracle);
            async move {
                let Some(source) = sources.get(candidate.path.as_str()) else {
                    console().debug(&format!(
                        "no source content for candidate {}, dropping",
                        candidate.path
                    ));
                    return None;
                };
                match oracle.score_file(&source.content, query).await {
                    Ok(judgement) => {
                        let status = if judgement.score >= self.pass_threshold {
                            VerdictStatus::Pass
                        } else {
                            VerdictStatus::Fail
                        };
                        Some(Verdict {
                            path: candidate.path.clone(),
                            score: Some(judgement.score),
                            status,
                            reason: judgement.reason,
                        })
                    }
                    Err(error) => Some(Verdict {
                        path: candidate.path.clone(),
                        score: None,
                        status: VerdictStatus::Error,
                        reason: error.to_string(),
                    }),
                }
            }
        }))
        .buffer_unordered(width)
        .collect()
        .await;

        verdicts.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;

    fn by_path(files: &[SourceFile]) -> HashMap<&str, &SourceFile> {
        files.iter().map(|f| (f.path.as_str(), f)).collect()
    }

    #[tokio::test]
    async fn test_threshold_splits_pass_and_fail() {
        let oracle = MockOracle::new()
            .with_default_score(3)
            .with_needle_score("login", 8);
        let verifier = RelevanceVerifier::new(Arc::new(oracle), 5, 2);

        let files = vec![
            SourceFile::new("auth.rs", "fn login() {}"),
            SourceFile::new("render.rs", "fn render() {}"),
        ];
        let candidates = vec![
            Candidate::new("auth.rs", "l1"),
            Candidate::new("render.rs", "l1"),
        ];

        let verdicts = verifier
            .verify(&candidates, &by_path(&files), "auth")
            .await;

        assert_eq!(verdicts.len(), 2);
        let auth = verdicts.iter().find(|v| v.path == "auth.rs").unwrap();
        assert_eq!(auth.status, VerdictStatus::Pass);
        assert_eq!(auth.score, Some(8));
        let render = verdicts.iter().find(|v| v.path == "render.rs").unwrap();
        assert_eq!(render.status, VerdictStatus::Fail);
    }

    #[tokio::test]
    async fn test_oracle_failure_yields_error_verdicts() {
        let verifier = RelevanceVerifier::new(Arc::new(MockOracle::failing()), 5, 2);
        let files = vec![SourceFile::new("a.rs", "content")];
        let candidates = vec![Candidate::new("a.rs", "l1")];

        let verdicts = verifier.verify(&candidates, &by_path(&files), "q").await;
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].status, VerdictStatus::Error);
        assert_eq!(verdicts[0].score, None);
    }

    #[tokio::test]
    async fn test_candidates_without_sources_are_skipped() {
        let verifier = RelevanceVerifier::new(Arc::new(MockOracle::new()), 5, 2);
        let files = vec![SourceFile::new("real.rs", "content")];
        let candidates = vec![
            Candidate::new("real.rs", "l1"),
            Candidate::new("hallucinated.rs", "l1"),
        ];

        let verdicts = verifier.verify(&candidates, &by_path(&files), "q").await;
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].path, "real.rs");
    }

    #[test]
    fn test_pool_width_respects_minimum() {
        let verifier = RelevanceVerifier::new(Arc::new(MockOracle::new()), 5, 64);
        assert!(verifier.pool_width() >= 64);
    }
}
