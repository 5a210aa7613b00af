use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::tokens::TokenCounter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub r#type: String, // Always "function"
    pub function: ToolFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub arguments: String, // JSON string
}

#[derive(Debug)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Result<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: String, tool_name: String, output: String) -> Self {
        Self {
            tool_call_id,
            tool_name,
            result: Ok(output),
        }
    }

    pub fn error(tool_call_id: String, tool_name: String, error: anyhow::Error) -> Self {
        Self {
            tool_call_id,
            tool_name,
            result: Err(error),
        }
    }

    pub fn to_message(&self) -> ConversationMessage {
        let content = match &self.result {
            Ok(output) => output.clone(),
            Err(error) => format!("Error: {}", error),
        };

        ConversationMessage {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(self.tool_call_id.clone()),
            name: Some(self.tool_name.clone()),
        }
    }
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Option<Vec<ToolCall>>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }

    pub fn is_user(&self) -> bool {
        self.role == "user"
    }

    /// An assistant message that carries tool calls.
    pub fn is_tool_call(&self) -> bool {
        self.role == "assistant" && self.tool_calls.is_some()
    }

    /// A tool message paired to a call via its `tool_call_id`.
    pub fn is_tool_result(&self) -> bool {
        self.role == "tool" && self.tool_call_id.is_some()
    }

    /// Render the message to plain text the way an oracle would see it:
    /// role, content, and tool-call names/arguments all count.
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", self.role, self.content.as_deref().unwrap_or(""));
        if let Some(tool_calls) = &self.tool_calls {
            for call in tool_calls {
                out.push_str(&format!(
                    "\n[tool_call {} {}]",
                    call.function.name, call.function.arguments
                ));
            }
        }
        out
    }

    /// Token cost of this message under `counter`, including role and
    /// tool-call payloads so that pruning decisions see the same weight
    /// the provider bills for.
    pub fn tokens(&self, counter: &dyn TokenCounter) -> usize {
        let mut total = counter.count(&self.role);
        if let Some(content) = &self.content {
            total += counter.count(content);
        }
        if let Some(tool_calls) = &self.tool_calls {
            for call in tool_calls {
                // Providers bill the serialized call, id and framing
                // included, so count that rather than the bare fields.
                match serde_json::to_string(call) {
                    Ok(serialized) => total += counter.count(&serialized),
                    Err(_) => {
                        total += counter.count(&call.function.name);
                        total += counter.count(&call.function.arguments);
                    }
                }
            }
        }
        if let Some(id) = &self.tool_call_id {
            total += counter.count(id);
        }
        total
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    pub fn add_system_message(&mut self, content: String) {
        self.messages.push(ConversationMessage::system(content));
    }

    pub fn add_user_message(&mut self, content: String) {
        self.messages.push(ConversationMessage::user(content));
    }

    pub fn add_assistant_message(
        &mut self,
        content: Option<String>,
        tool_calls: Option<Vec<ToolCall>>,
    ) {
        self.messages
            .push(ConversationMessage::assistant(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, tool_result: ToolResult) {
        self.messages.push(tool_result.to_message());
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Total token cost of the conversation under `counter`.
    pub fn tokens(&self, counter: &dyn TokenCounter) -> usize {
        self.messages.iter().map(|m| m.tokens(counter)).sum()
    }
}
