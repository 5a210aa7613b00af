//! Budget enforcement: reducing oversized content and conversations
//! until they fit a token budget, preserving structure along the way.

mod content_pruner;
mod conversation_pruner;

use serde::{Deserialize, Serialize};

pub use content_pruner::{ContentPruner, OMITTED_CONTENT_MARKER};
pub use conversation_pruner::{CLEARED_MESSAGE, ConversationPruner, PruneResult};

/// How an oversized unit gets reduced.
///
/// `Delete` is free and always available; `Score` and `Extract` spend an
/// oracle call per unit for better continuity and degrade to `Delete`
/// when the oracle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneStrategy {
    #[default]
    Delete,
    Score,
    Extract,
}
