use std::sync::Arc;

use crate::console::console;
use crate::oracle::RelevanceOracle;
use crate::sources::SourceFile;
use crate::tokens::TokenCounter;

use super::PruneStrategy;

/// Stand-in for content elided by the delete strategy.
pub const OMITTED_CONTENT_MARKER: &str = "[content omitted to fit the token budget]";

/// Stateless reduction strategies over file lists and over a single
/// oversized unit of content. Used by the payload assembler for outsized
/// files and by the conversation pruner for message units.
pub struct ContentPruner {
    oracle: Arc<dyn RelevanceOracle>,
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
    score_threshold: i32,
}

impl ContentPruner {
    pub fn new(
        oracle: Arc<dyn RelevanceOracle>,
        counter: Arc<dyn TokenCounter>,
        max_tokens: usize,
        score_threshold: i32,
    ) -> Self {
        Self {
            oracle,
            counter,
            max_tokens,
            score_threshold,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Reduce a file list to the token budget. Returns the input
    /// unchanged (token counts filled in) when it already fits.
    ///
    /// Scoring runs sequentially on purpose: concurrency in this crate
    /// is confined to the verification stage.
    pub async fn prune_files(
        &self,
        files: Vec<SourceFile>,
        query: &str,
        strategy: PruneStrategy,
    ) -> Vec<SourceFile> {
        let (total, files) = self.count_files(files);
        if total <= self.max_tokens {
            return files;
        }

        console().verbose(&format!(
            "Pruning {} files ({} tokens) to a {} token budget via {:?}",
            files.len(),
            total,
            self.max_tokens,
            strategy
        ));

        match strategy {
            PruneStrategy::Delete => self.delete_overflow(files),
            PruneStrategy::Score => self.score_and_filter(files, query).await,
            PruneStrategy::Extract => self.extract_excerpts(files, query).await,
        }
    }

    /// Reduce a single oversized unit (message body or file content).
    ///
    /// `Delete` always succeeds with the fixed marker. `Score` keeps the
    /// content at or above the threshold and drops it (`None`) below.
    /// `Extract` replaces it with a bounded excerpt; `None` when the
    /// oracle found nothing relevant. Oracle failures degrade to the
    /// delete marker so progress never stalls on an unreachable model.
    pub async fn prune_content(
        &self,
        content: &str,
        query: &str,
        strategy: PruneStrategy,
    ) -> Option<String> {
        match strategy {
            PruneStrategy::Delete => Some(OMITTED_CONTENT_MARKER.to_string()),
            PruneStrategy::Score => match self.oracle.score_message(content, query).await {
                Ok(judgement) if judgement.score >= self.score_threshold => {
                    Some(content.to_string())
                }
                Ok(_) => None,
                Err(error) => {
                    console().warning(&format!("Scoring failed, deleting content: {}", error));
                    Some(OMITTED_CONTENT_MARKER.to_string())
                }
            },
            PruneStrategy::Extract => match self.oracle.excerpt(content, query).await {
                Ok(excerpt) if excerpt.trim().is_empty() => None,
                Ok(excerpt) => Some(self.truncate_to_tokens(&excerpt, self.max_tokens)),
                Err(error) => {
                    console().warning(&format!("Excerpting failed, deleting content: {}", error));
                    Some(OMITTED_CONTENT_MARKER.to_string())
                }
            },
        }
    }

    /// Hard token bound, cutting at UTF-8 boundaries.
    pub fn truncate_to_tokens(&self, content: &str, max_tokens: usize) -> String {
        let mut text = content.to_string();
        let mut tokens = self.counter.count(&text);
        while tokens > max_tokens && !text.is_empty() {
            let mut cut = (text.len() * max_tokens / tokens).min(text.len() - 1);
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            tokens = self.counter.count(&text);
        }
        text
    }

    fn count_files(&self, files: Vec<SourceFile>) -> (usize, Vec<SourceFile>) {
        let mut total = 0;
        let mut counted = Vec::with_capacity(files.len());
        for mut file in files {
            if file.tokens == 0 {
                file.tokens = self.counter.count(&file.content);
            }
            total += file.tokens;
            counted.push(file);
        }
        (total, counted)
    }

    /// Keep files in order until the budget is exhausted, drop the rest.
    fn delete_overflow(&self, files: Vec<SourceFile>) -> Vec<SourceFile> {
        let mut total = 0;
        let mut selected = Vec::new();
        for file in files {
            if total + file.tokens > self.max_tokens {
                break;
            }
            total += file.tokens;
            selected.push(file);
        }
        selected
    }

    /// Score every file, then fill the budget from the highest score
    /// down. A file whose scoring call fails is skipped, not fatal.
    async fn score_and_filter(&self, files: Vec<SourceFile>, query: &str) -> Vec<SourceFile> {
        let mut scored: Vec<(i32, SourceFile)> = Vec::with_capacity(files.len());
        for file in files {
            match self.oracle.score_file(&file.content, query).await {
                Ok(judgement) => scored.push((judgement.score, file)),
                Err(error) => {
                    console().warning(&format!("Failed to score {}: {}", file.path, error));
                }
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let mut total = 0;
        let mut selected = Vec::new();
        for (_, file) in scored {
            if total + file.tokens > self.max_tokens {
                break;
            }
            total += file.tokens;
            selected.push(file);
        }
        selected
    }

    /// Whole files are kept while they fit in 80% of the budget; after
    /// that each file is replaced by a query-focused excerpt until even
    /// excerpts no longer fit.
    async fn extract_excerpts(&self, files: Vec<SourceFile>, query: &str) -> Vec<SourceFile> {
        let whole_file_budget = self.max_tokens * 8 / 10;
        let mut used = 0;
        let mut selected = Vec::new();

        for file in files {
            if used + file.tokens <= whole_file_budget {
                used += file.tokens;
                selected.push(file);
                continue;
            }

            match self.prune_content(&file.content, query, PruneStrategy::Extract).await {
                Some(excerpt) => {
                    let tokens = self.counter.count(&excerpt);
                    if used + tokens > self.max_tokens {
                        break;
                    }
                    used += tokens;
                    selected.push(SourceFile {
                        content: excerpt,
                        tokens,
                        ..file
                    });
                }
                None => {
                    console().verbose(&format!("No relevant excerpt for {}, skipping", file.path));
                }
            }
        }
        selected
    }
}
