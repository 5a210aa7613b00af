use std::collections::HashSet;
use std::sync::Arc;

use crate::config::PrunerConfig;
use crate::console::console;
use crate::conversations::ConversationMessage;
use crate::oracle::RelevanceOracle;
use crate::tokens::TokenCounter;

use super::{ContentPruner, PruneStrategy};

/// Replacement body for messages cleared by the delete strategy. The
/// wording matters: it tells the model the information is recoverable by
/// re-running the tool, not lost.
pub const CLEARED_MESSAGE: &str =
    "This message has been cleared to save tokens. Call the tool again if you still need its output.";

/// Outcome of a pruning pass.
#[derive(Debug, Clone)]
pub struct PruneResult {
    pub messages: Vec<ConversationMessage>,
    pub original_tokens: usize,
    pub final_tokens: usize,
    /// Units removed or reduced, counting a tool-call/result pair as one.
    pub dropped_units: usize,
    /// True when every non-pinned unit has been reduced and the total
    /// still exceeds the budget. Reported, never hidden.
    pub exhausted: bool,
}

impl PruneResult {
    pub fn unchanged(messages: Vec<ConversationMessage>, tokens: usize) -> Self {
        Self {
            messages,
            original_tokens: tokens,
            final_tokens: tokens,
            dropped_units: 0,
            exhausted: false,
        }
    }
}

/// A removable unit: either a single message, or an assistant tool-call
/// message together with its paired tool-result messages. Members are
/// removed or reduced together, never split.
#[derive(Debug, Clone)]
struct MessageUnit {
    indices: Vec<usize>,
}

/// Reduces a conversation to a token budget without breaking the
/// tool-call/tool-result pairing or touching the system prompt and the
/// initial task.
pub struct ConversationPruner {
    config: PrunerConfig,
    oracle: Arc<dyn RelevanceOracle>,
    counter: Arc<dyn TokenCounter>,
    content_pruner: ContentPruner,
}

impl ConversationPruner {
    pub fn new(
        config: PrunerConfig,
        oracle: Arc<dyn RelevanceOracle>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        let content_pruner = ContentPruner::new(
            Arc::clone(&oracle),
            Arc::clone(&counter),
            config.excerpt_token_budget,
            config.score_threshold,
        );
        Self {
            config,
            oracle,
            counter,
            content_pruner,
        }
    }

    /// Prune with the configured strategy and budget.
    pub async fn prune(&self, messages: &[ConversationMessage], query: &str) -> PruneResult {
        self.prune_with(messages, query, self.config.strategy, self.config.budget)
            .await
    }

    pub async fn prune_with(
        &self,
        messages: &[ConversationMessage],
        query: &str,
        strategy: PruneStrategy,
        budget: usize,
    ) -> PruneResult {
        let original_tokens = self.total_tokens(messages);
        if original_tokens <= budget {
            return PruneResult::unchanged(messages.to_vec(), original_tokens);
        }

        let units = split_into_units(messages);
        let pinned = pinned_units(messages, &units);

        // Slots keep positional identity while units are reduced or
        // removed; `None` marks a removed message.
        let mut slots: Vec<Option<ConversationMessage>> =
            messages.iter().cloned().map(Some).collect();
        let mut dropped_units = 0;

        for (unit_index, unit) in units.iter().enumerate() {
            if self.slot_tokens(&slots) <= budget {
                break;
            }
            if pinned.contains(&unit_index) {
                continue;
            }
            let reduced = self.reduce_unit(&mut slots, unit, strategy, query).await;
            if reduced {
                dropped_units += 1;
            }
        }

        let final_messages: Vec<ConversationMessage> = slots.into_iter().flatten().collect();
        let final_tokens = self.total_tokens(&final_messages);
        let exhausted = final_tokens > budget;

        if exhausted {
            console().warning(&format!(
                "Prune exhausted: {} tokens still above the {} budget",
                final_tokens, budget
            ));
        } else {
            console().verbose(&format!(
                "Pruned conversation: {} -> {} tokens, {} units reduced",
                original_tokens, final_tokens, dropped_units
            ));
        }

        PruneResult {
            messages: final_messages,
            original_tokens,
            final_tokens,
            dropped_units,
            exhausted,
        }
    }

    fn total_tokens(&self, messages: &[ConversationMessage]) -> usize {
        messages
            .iter()
            .map(|m| m.tokens(self.counter.as_ref()))
            .sum()
    }

    fn slot_tokens(&self, slots: &[Option<ConversationMessage>]) -> usize {
        slots
            .iter()
            .flatten()
            .map(|m| m.tokens(self.counter.as_ref()))
            .sum()
    }

    /// Apply `strategy` to one unit. Returns true when the unit was
    /// reduced or removed.
    async fn reduce_unit(
        &self,
        slots: &mut [Option<ConversationMessage>],
        unit: &MessageUnit,
        strategy: PruneStrategy,
        query: &str,
    ) -> bool {
        match strategy {
            PruneStrategy::Delete => {
                delete_unit(slots, unit);
                true
            }
            PruneStrategy::Score => {
                let rendered = render_unit(slots, unit);
                match self.oracle.score_message(&rendered, query).await {
                    Ok(judgement) if judgement.score < self.config.score_threshold => {
                        for &index in &unit.indices {
                            slots[index] = None;
                        }
                        true
                    }
                    Ok(_) => false,
                    Err(error) => {
                        console().warning(&format!(
                            "Unit scoring failed, degrading to delete: {}",
                            error
                        ));
                        delete_unit(slots, unit);
                        true
                    }
                }
            }
            PruneStrategy::Extract => {
                let mut reduced = false;
                for &index in &unit.indices {
                    let Some(message) = slots[index].as_mut() else {
                        continue;
                    };
                    let Some(content) = message.content.clone() else {
                        continue;
                    };
                    if content.is_empty() {
                        continue;
                    }
                    // Degrades to the delete marker internally when the
                    // oracle fails, so this always makes progress.
                    let replacement = self
                        .content_pruner
                        .prune_content(&content, query, PruneStrategy::Extract)
                        .await
                        .unwrap_or_else(|| CLEARED_MESSAGE.to_string());
                    if replacement.len() < content.len() {
                        message.content = Some(replacement);
                        reduced = true;
                    }
                }
                reduced
            }
        }
    }
}

/// Group messages into removable units: an assistant message carrying
/// tool calls swallows the tool-result messages paired to it by
/// `tool_call_id`; everything else stands alone.
fn split_into_units(messages: &[ConversationMessage]) -> Vec<MessageUnit> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        if messages[i].is_tool_call() {
            let ids: HashSet<&str> = messages[i]
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(|c| c.id.as_str()).collect())
                .unwrap_or_default();
            let mut indices = vec![i];
            let mut j = i + 1;
            while j < messages.len()
                && messages[j].is_tool_result()
                && messages[j]
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| ids.contains(id))
            {
                indices.push(j);
                j += 1;
            }
            units.push(MessageUnit { indices });
            i = j;
        } else {
            units.push(MessageUnit { indices: vec![i] });
            i += 1;
        }
    }
    units
}

/// Units containing a system message or the first user message are never
/// reduced.
fn pinned_units(messages: &[ConversationMessage], units: &[MessageUnit]) -> HashSet<usize> {
    let first_user = messages.iter().position(|m| m.is_user());
    units
        .iter()
        .enumerate()
        .filter(|(_, unit)| {
            unit.indices
                .iter()
                .any(|&i| messages[i].is_system() || Some(i) == first_user)
        })
        .map(|(index, _)| index)
        .collect()
}

/// Replace every member's content with the fixed marker, preserving
/// message count, roles and pairing structure. Tool-call arguments are
/// stubbed out too; they often carry the bulk of the tokens.
fn delete_unit(slots: &mut [Option<ConversationMessage>], unit: &MessageUnit) {
    for &index in &unit.indices {
        if let Some(message) = slots[index].as_mut() {
            if message.content.is_some() {
                message.content = Some(CLEARED_MESSAGE.to_string());
            }
            if let Some(tool_calls) = message.tool_calls.as_mut() {
                for call in tool_calls {
                    call.function.arguments = "{}".to_string();
                }
            }
        }
    }
}

fn render_unit(slots: &[Option<ConversationMessage>], unit: &MessageUnit) -> String {
    unit.indices
        .iter()
        .filter_map(|&i| slots[i].as_ref())
        .map(|m| m.render())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::{ToolCall, ToolFunction};
    use crate::oracle::MockOracle;
    use crate::tokens::ApproxCounter;

    fn tool_call_pair(id: &str, output_size: usize) -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::assistant(
                None,
                Some(vec![ToolCall {
                    id: id.to_string(),
                    r#type: "function".to_string(),
                    function: ToolFunction {
                        name: "read_file".to_string(),
                        arguments: "{\"path\": \"a.rs\"}".to_string(),
                    },
                }]),
            ),
            ConversationMessage {
                role: "tool".to_string(),
                content: Some("x".repeat(output_size)),
                tool_calls: None,
                tool_call_id: Some(id.to_string()),
                name: Some("read_file".to_string()),
            },
        ]
    }

    fn pruner(oracle: MockOracle) -> ConversationPruner {
        ConversationPruner::new(
            PrunerConfig::default(),
            Arc::new(oracle),
            Arc::new(ApproxCounter),
        )
    }

    #[test]
    fn test_split_units_groups_pairs() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("task"),
        ];
        messages.extend(tool_call_pair("call_1", 100));
        messages.push(ConversationMessage::assistant(Some("done".into()), None));

        let units = split_into_units(&messages);
        assert_eq!(units.len(), 4);
        assert_eq!(units[2].indices, vec![2, 3]);
    }

    #[test]
    fn test_pinned_units_cover_system_and_first_user() {
        let messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("first task"),
            ConversationMessage::user("second question"),
        ];
        let units = split_into_units(&messages);
        let pinned = pinned_units(&messages, &units);
        assert!(pinned.contains(&0));
        assert!(pinned.contains(&1));
        assert!(!pinned.contains(&2));
    }

    #[tokio::test]
    async fn test_unchanged_when_within_budget() {
        let pruner = pruner(MockOracle::new());
        let messages = vec![
            ConversationMessage::system("s"),
            ConversationMessage::user("u"),
        ];
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Delete, 10_000)
            .await;
        assert_eq!(result.dropped_units, 0);
        assert!(!result.exhausted);
        assert_eq!(result.original_tokens, result.final_tokens);
    }

    #[tokio::test]
    async fn test_delete_preserves_count_and_pairs() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("the original task"),
        ];
        messages.extend(tool_call_pair("call_1", 2000));
        messages.extend(tool_call_pair("call_2", 2000));
        messages.push(ConversationMessage::assistant(Some("done".into()), None));

        let pruner = pruner(MockOracle::new());
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Delete, 300)
            .await;

        assert_eq!(result.messages.len(), messages.len());
        assert!(result.dropped_units > 0);
        assert_eq!(result.messages[0].content.as_deref(), Some("system prompt"));
        assert_eq!(
            result.messages[1].content.as_deref(),
            Some("the original task")
        );
        assert_eq!(result.messages[3].content.as_deref(), Some(CLEARED_MESSAGE));
        assert!(result.final_tokens < result.original_tokens);
    }

    #[tokio::test]
    async fn test_score_removes_whole_units() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("task"),
        ];
        messages.extend(tool_call_pair("call_1", 2000));

        let oracle = MockOracle::new().with_default_score(1);
        let pruner = pruner(oracle);
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Score, 100)
            .await;

        // The pair is gone entirely; no orphaned member remains.
        assert!(!result.messages.iter().any(|m| m.is_tool_call()));
        assert!(!result.messages.iter().any(|m| m.is_tool_result()));
        assert_eq!(result.dropped_units, 1);
    }

    #[tokio::test]
    async fn test_score_failure_degrades_to_delete() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("task"),
        ];
        messages.extend(tool_call_pair("call_1", 2000));

        let pruner = pruner(MockOracle::failing());
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Score, 100)
            .await;

        // Degraded delete keeps the pair but clears its content.
        assert_eq!(result.messages.len(), messages.len());
        assert_eq!(result.messages[3].content.as_deref(), Some(CLEARED_MESSAGE));
        assert!(result.dropped_units > 0);
    }

    #[tokio::test]
    async fn test_extract_replaces_content_with_excerpt() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("task"),
        ];
        messages.extend(tool_call_pair("call_1", 4000));

        let oracle = MockOracle::new().with_excerpt("the relevant two lines");
        let pruner = pruner(oracle);
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Extract, 100)
            .await;

        assert_eq!(
            result.messages[3].content.as_deref(),
            Some("the relevant two lines")
        );
        assert!(result.final_tokens < result.original_tokens);
    }

    #[tokio::test]
    async fn test_exhausted_reported_when_pinned_messages_exceed_budget() {
        let messages = vec![
            ConversationMessage::system("s".repeat(4000)),
            ConversationMessage::user("u".repeat(4000)),
        ];
        let pruner = pruner(MockOracle::new());
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Delete, 100)
            .await;

        assert!(result.exhausted);
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.dropped_units, 0);
        // Pinned content is untouched even under exhaustion.
        assert_eq!(result.messages[0].content.as_ref().unwrap().len(), 4000);
    }

    #[tokio::test]
    async fn test_stops_at_budget_without_touching_later_units() {
        let mut messages = vec![
            ConversationMessage::system("system prompt"),
            ConversationMessage::user("task"),
        ];
        messages.extend(tool_call_pair("call_1", 4000));
        messages.extend(tool_call_pair("call_2", 40));

        let pruner = pruner(MockOracle::new());
        let result = pruner
            .prune_with(&messages, "query", PruneStrategy::Delete, 200)
            .await;

        // Clearing the first oversized pair is enough; the second pair
        // keeps its original output.
        assert_eq!(result.messages[5].content.as_deref(), Some(&"x".repeat(40)[..]));
        assert_eq!(result.dropped_units, 1);
        assert!(!result.exhausted);
    }
}
