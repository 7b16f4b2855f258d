//! The result of one LLM invocation cycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{ToolCall, ToolExecutionResult};
use crate::usage::Usage;

/// The model's response for a single [`Turn`].
///
/// `hasToolCalls`/`toolCalls` in the spec surface here as
/// [`Response::has_tool_calls`] and [`Response::tool_calls`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// The response's text content.
    pub text: String,
    /// Tool calls requested by the model, if any.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Structured data extracted from the response, if the caller decoded
    /// one (e.g. the `plan` strategy's planning call).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Create a plain-text response with no tool calls.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            data: None,
        }
    }

    /// Create a response carrying tool calls.
    #[must_use]
    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            data: None,
        }
    }

    /// Attach decoded structured data to this response.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether the model asked for further tool invocation.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One LLM response cycle, including any tool round-trip performed for it.
///
/// `cycles` counts internal LLM round-trips the provider itself performed
/// while producing this turn (see the `loop` strategy's rationale, §4.1.1);
/// callers that invoke the LLM exactly once per turn should leave it at `1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// The model's response.
    pub response: Response,
    /// Messages produced during this turn (assistant response, tool
    /// results), to be absorbed into [`crate::state::State`].
    pub messages: Vec<crate::message::Message>,
    /// Results of any tool calls executed for this turn.
    #[serde(default)]
    pub tool_executions: Vec<ToolExecutionResult>,
    /// Token usage for this turn.
    #[serde(default)]
    pub usage: Usage,
    /// Internal LLM round-trips performed to produce this turn.
    #[serde(default = "one")]
    pub cycles: u32,
}

const fn one() -> u32 {
    1
}

impl Turn {
    /// Create a turn with no tool executions and a single cycle.
    #[must_use]
    pub fn new(response: Response, messages: Vec<crate::message::Message>, usage: Usage) -> Self {
        Self {
            response,
            messages,
            tool_executions: Vec::new(),
            usage,
            cycles: 1,
        }
    }

    /// Attach tool execution results to this turn.
    #[must_use]
    pub fn with_tool_executions(mut self, tool_executions: Vec<ToolExecutionResult>) -> Self {
        self.tool_executions = tool_executions;
        self
    }

    /// Override the cycle count.
    #[must_use]
    pub const fn with_cycles(mut self, cycles: u32) -> Self {
        self.cycles = cycles;
        self
    }
}
