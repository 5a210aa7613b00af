pub mod config;
pub mod console;
pub mod conversations;
pub mod index;
pub mod oracle;
pub mod pruning;
pub mod selection;
pub mod sources;
pub mod tokens;

pub use config::{ConfigError, ContextConfig, PrunerConfig, SelectorConfig};
pub use console::{Console, VerbosityLevel, console, init_console};
pub use conversations::{Conversation, ConversationMessage, ToolCall, ToolFunction, ToolResult};
pub use index::{IndexEntry, SymbolIndex};
pub use oracle::{MockOracle, RankedFile, RelevanceJudgement, RelevanceOracle};
pub use pruning::{
    CLEARED_MESSAGE, ContentPruner, ConversationPruner, OMITTED_CONTENT_MARKER, PruneResult,
    PruneStrategy,
};
pub use selection::{
    FileRelevanceSelector, FileSelection, RelevanceVerifier, Verdict, VerdictStatus,
};
pub use sources::{Candidate, SourceFile, SourceTag};
pub use tokens::{
    ApproxCounter, TiktokenCounter, TokenCounter, TokenCounterError, TokenizerConfig,
    build_token_counter,
};
