//! File relevance selection.
//!
//! Narrows a whole-project file set down to a small, verified,
//! token-fitting subset for a query. The pipeline runs a fixed stage
//! order — tag bypass, keyword filter, related-file expansion, full-set
//! fallback, verification, cap — with the candidate accumulator threaded
//! through pure stage functions rather than mutated in place, so stage
//! boundaries stay visible and ordering bugs stay impossible.

mod verifier;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::SelectorConfig;
use crate::console::console;
use crate::index::SymbolIndex;
use crate::oracle::RelevanceOracle;
use crate::pruning::{ContentPruner, OMITTED_CONTENT_MARKER, PruneStrategy};
use crate::sources::{Candidate, SourceFile, normalize_path};
use crate::tokens::TokenCounter;

pub use verifier::{RelevanceVerifier, Verdict, VerdictStatus};

/// What a selection run hands back: the surviving files (content already
/// reduced where a single file blew the per-file budget), the
/// concatenated payload, and the run's verdicts for reporting.
#[derive(Debug)]
pub struct FileSelection {
    pub files: Vec<SourceFile>,
    pub payload: String,
    pub total_tokens: usize,
    pub survivors: Vec<Candidate>,
    pub verdicts: Vec<Verdict>,
}

/// Stage 1: tagged files skip filtering entirely.
fn stage_tag_bypass(files: &[SourceFile]) -> IndexMap<String, Candidate> {
    let mut acc = IndexMap::new();
    for file in files {
        if file.tag.bypasses_filtering() {
            let path = normalize_path(&file.path);
            acc.insert(
                path.clone(),
                Candidate::new(path, "rest/rag/search resource"),
            );
        }
    }
    acc
}

/// Stages 2 and 3: filter results land in the accumulator with
/// last-writer-wins semantics — a later stage's candidate for the same
/// path replaces the earlier one, reason and all.
fn stage_insert(
    mut acc: IndexMap<String, Candidate>,
    candidates: Vec<Candidate>,
) -> IndexMap<String, Candidate> {
    for candidate in candidates {
        acc.insert(candidate.path.clone(), candidate);
    }
    acc
}

/// Stage 4: when filtering found nothing, every project file becomes a
/// candidate so the pipeline never starves a caller. Existing entries
/// keep their more specific reasons.
fn stage_fallback(
    mut acc: IndexMap<String, Candidate>,
    files: &[SourceFile],
) -> IndexMap<String, Candidate> {
    for file in files {
        let path = normalize_path(&file.path);
        acc.entry(path.clone())
            .or_insert_with(|| Candidate::new(path, "no related files found, using all files"));
    }
    acc
}

/// Stage 5: verification is not additive — its output replaces the
/// accumulator, in task-completion order. The one exception: a batch
/// whose every verdict is an error means the oracle itself was
/// unreachable, and dropping everything for that would starve the
/// caller, so the unverified set is kept instead.
fn stage_verified(
    acc: IndexMap<String, Candidate>,
    verdicts: &[Verdict],
) -> IndexMap<String, Candidate> {
    if !verdicts.is_empty()
        && verdicts
            .iter()
            .all(|verdict| verdict.status == VerdictStatus::Error)
    {
        console().warning(
            "Verification oracle unreachable for every candidate, keeping the unverified set",
        );
        return acc;
    }

    let mut verified = IndexMap::new();
    for verdict in verdicts {
        if verdict.status == VerdictStatus::Pass {
            let score = verdict.score.unwrap_or_default();
            verified.insert(
                verdict.path.clone(),
                Candidate {
                    path: verdict.path.clone(),
                    reason: format!("score:{}, {}", score, verdict.reason),
                    score: verdict.score,
                },
            );
        }
    }
    verified
}

/// Stage 6: order survivors by score descending (path ascending breaks
/// ties) and truncate to the cap. Unscored survivors — skipped or
/// degraded verification — keep their accumulator order.
fn stage_cap(
    mut acc: IndexMap<String, Candidate>,
    max_files: Option<usize>,
) -> IndexMap<String, Candidate> {
    acc.sort_by(|path_a, a, path_b, b| match (a.score, b.score) {
        (Some(score_a), Some(score_b)) => {
            score_b.cmp(&score_a).then_with(|| path_a.cmp(path_b))
        }
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    if let Some(max) = max_files {
        acc.truncate(max);
    }
    acc
}

/// Multi-level file relevance selector.
pub struct FileRelevanceSelector {
    config: SelectorConfig,
    counter: Arc<dyn TokenCounter>,
    index: SymbolIndex,
    verifier: RelevanceVerifier,
    content_pruner: ContentPruner,
}

impl FileRelevanceSelector {
    pub fn new(
        config: SelectorConfig,
        oracle: Arc<dyn RelevanceOracle>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let index = SymbolIndex::new(Arc::clone(&oracle), config.filter_batch_size);
        let verifier = RelevanceVerifier::new(
            Arc::clone(&oracle),
            config.pass_threshold,
            config.min_verify_workers,
        );
        let content_pruner = ContentPruner::new(
            Arc::clone(&oracle),
            Arc::clone(&counter),
            config.file_token_budget,
            config.pass_threshold,
        );
        Self {
            config,
            counter,
            index,
            verifier,
            content_pruner,
        }
    }

    pub fn index(&self) -> &SymbolIndex {
        &self.index
    }

    /// Run the full pipeline over `files` for `query`. The index is
    /// rebuilt incrementally on every call, so repeated selections over
    /// an unchanged file set are cheap and yield the same survivors.
    pub async fn select(&mut self, files: &[SourceFile], query: &str) -> FileSelection {
        let mut acc = stage_tag_bypass(files);
        let mut filter_hits = 0usize;

        if !self.config.skip_indexing {
            console().stage("building symbol index");
            self.index.build(files);

            if self.config.filter_level >= 1 {
                console().stage("level-1 keyword filter");
                let ranked = self.index.query_by_keyword(query).await;
                filter_hits += ranked.len();
                let level1_paths: Vec<String> =
                    ranked.iter().map(|c| c.path.clone()).collect();
                acc = stage_insert(acc, ranked);

                if !level1_paths.is_empty() && self.config.filter_level >= 2 {
                    console().stage("level-2 related-file expansion");
                    let related = self.index.related_to(&level1_paths).await;
                    filter_hits += related.len();
                    acc = stage_insert(acc, related);
                }
            }
        }

        if filter_hits == 0 {
            console().warning("No related files found, falling back to the full project set");
            acc = stage_fallback(acc, files);
        }

        let mut verdicts = Vec::new();
        if !self.config.skip_verification {
            console().stage("relevance verification");
            let by_path: HashMap<&str, &SourceFile> =
                files.iter().map(|f| (f.path.as_str(), f)).collect();
            let candidates: Vec<Candidate> = acc.values().cloned().collect();
            verdicts = self.verifier.verify(&candidates, &by_path, query).await;

            let passed = verdicts
                .iter()
                .filter(|v| v.status == VerdictStatus::Pass)
                .count();
            console().verbose(&format!(
                "verification: {}/{} candidates passed",
                passed,
                verdicts.len()
            ));

            acc = stage_verified(acc, &verdicts);
        }

        let acc = stage_cap(acc, self.config.max_files);

        self.assemble(acc, files, query, verdicts).await
    }

    /// Concatenate surviving files as `##File: <path>` blocks. Each path
    /// is emitted at most once, enforced by a seen-set independent of
    /// the accumulator's own dedup. A file blowing the per-file budget
    /// is reduced to a query-focused excerpt first.
    async fn assemble(
        &self,
        survivors: IndexMap<String, Candidate>,
        files: &[SourceFile],
        query: &str,
        verdicts: Vec<Verdict>,
    ) -> FileSelection {
        let mut payload = String::new();
        let mut emitted = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for file in files {
            let path = normalize_path(&file.path);
            if !survivors.contains_key(&path) || seen.contains(&path) {
                continue;
            }
            seen.insert(path.clone());

            let mut content = file.content.clone();
            let mut tokens = file.tokens_or_count(self.counter.as_ref());
            if tokens > self.config.file_token_budget {
                console().verbose(&format!(
                    "{} exceeds the per-file budget ({} tokens), extracting",
                    path, tokens
                ));
                content = self
                    .content_pruner
                    .prune_content(&content, query, PruneStrategy::Extract)
                    .await
                    .unwrap_or_else(|| OMITTED_CONTENT_MARKER.to_string());
                tokens = self.counter.count(&content);
            }

            payload.push_str(&format!("##File: {}\n{}\n\n", path, content));
            emitted.push(SourceFile {
                path: path.clone(),
                content,
                tag: file.tag,
                tokens,
                metadata: file.metadata.clone(),
            });
        }

        let total_tokens = self.counter.count(&payload);
        if emitted.is_empty() {
            console().warning("No target files selected; the query may need rewording");
        } else {
            console().verbose(&format!(
                "selected {} files, {} payload tokens",
                emitted.len(),
                total_tokens
            ));
        }

        FileSelection {
            files: emitted,
            payload,
            total_tokens,
            survivors: survivors.into_values().collect(),
            verdicts,
        }
    }
}
