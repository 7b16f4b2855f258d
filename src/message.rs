//! Message types exchanged between the runtime and the LLM provider.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System message providing instructions.
    System,
    /// User message.
    User,
    /// Assistant (model) message, optionally carrying tool calls.
    Assistant,
    /// A tool's result, addressed back to a specific tool call.
    Tool,
}

/// Content of a message.
///
/// Only text is modeled today; the tag leaves room for non-text content
/// without a breaking change to [`Message`] itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    /// Plain text content.
    Text {
        /// The text.
        text: String,
    },
}

impl MessageContent {
    /// Create text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The sender's role.
    pub role: MessageRole,
    /// The message content.
    pub content: Vec<MessageContent>,
    /// For `Tool`-role messages, the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `Assistant`-role messages, tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(MessageRole::System, text)
    }

    /// Create a user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(MessageRole::User, text)
    }

    /// Create an assistant message with plain text and no tool calls.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, text)
    }

    /// Create an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::text(MessageRole::Assistant, text);
        message.tool_calls = Some(tool_calls);
        message
    }

    /// Create a tool-result message answering `tool_call_id`.
    #[must_use]
    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::text(MessageRole::Tool, text);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![MessageContent::text(text)],
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Concatenate all text content into a single string.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                MessageContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
