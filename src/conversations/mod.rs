mod conversation;

pub use conversation::{Conversation, ConversationMessage, ToolCall, ToolFunction, ToolResult};
