//! Tools: the descriptors agents call and the calls the LLM asks for.
//!
//! See [`scheduler`] for the dependency-aware batching that turns a flat
//! list of calls into ordered execution groups.

pub mod scheduler;

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use scheduler::{
    Group, execute_ordered_tool_calls, has_call_dependencies, has_tool_dependencies,
    order_tool_calls,
};

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier the model used for this call; tool results are addressed
    /// back to it.
    pub tool_call_id: String,
    /// Name of the tool being invoked.
    pub tool_name: String,
    /// Arguments for the call, as raw JSON.
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    #[must_use]
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// A [`ToolCall`] annotated with a call-declared ordering constraint.
///
/// `after` lists tool-call ids (not tool names) that must have already
/// landed in an earlier scheduler group before this call becomes eligible.
/// An id absent from the batch is treated as vacuous — see
/// [`scheduler::order_tool_calls`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedToolCall {
    /// The underlying call.
    #[serde(flatten)]
    pub call: ToolCall,
    /// Tool-call ids this call must follow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

impl OrderedToolCall {
    /// Wrap a [`ToolCall`] with no extra ordering constraint.
    #[must_use]
    pub const fn new(call: ToolCall) -> Self {
        Self {
            call,
            after: Vec::new(),
        }
    }

    /// Wrap a [`ToolCall`] with an explicit `after` list.
    #[must_use]
    pub const fn with_after(call: ToolCall, after: Vec<String>) -> Self {
        Self { call, after }
    }
}

impl From<ToolCall> for OrderedToolCall {
    fn from(call: ToolCall) -> Self {
        Self::new(call)
    }
}

impl Deref for OrderedToolCall {
    type Target = ToolCall;

    fn deref(&self) -> &Self::Target {
        &self.call
    }
}

/// Static metadata about a tool, independent of any particular call.
///
/// This is the shape the scheduler reasons over: `sequential` and
/// `depends_on` drive the ordering rules in [`scheduler::order_tool_calls`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, as referenced by [`ToolCall::tool_name`].
    pub name: String,
    /// Human-readable description, surfaced to the LLM for tool selection.
    pub description: String,
    /// JSON schema for the tool's parameters.
    pub parameters: Value,
    /// When `true`, every call to this tool becomes its own barrier group.
    #[serde(default)]
    pub sequential: bool,
    /// Tool names that must have at least one call placed in an earlier
    /// group before this tool's calls become eligible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl ToolDescriptor {
    /// Create a descriptor with no ordering constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            sequential: false,
            depends_on: Vec::new(),
        }
    }

    /// Mark this tool as requiring its own barrier group per call.
    #[must_use]
    pub const fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    /// Declare tool-level dependencies.
    #[must_use]
    pub fn depends_on(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// A runnable tool.
///
/// Implementations provide the [`ToolDescriptor`] the scheduler and LLM
/// request-builder need, plus the actual `run` body.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static metadata for this tool.
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute the tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns an error message on failure; the caller packages it into a
    /// [`ToolExecutionResult`] rather than propagating it as an
    /// [`crate::error::AgentError`] (tool errors are local, per the
    /// propagation policy in [`crate::strategy`]).
    async fn run(&self, arguments: Value) -> std::result::Result<Value, String>;
}

/// A boxed, shared tool.
pub type BoxedTool = Arc<dyn Tool>;

/// A registry of tools, addressable by name.
#[derive(Clone, Default)]
pub struct ToolBox {
    tools: HashMap<String, BoxedTool>,
}

impl ToolBox {
    /// Create an empty tool box.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    pub fn add(&mut self, tool: impl Tool + 'static) {
        self.add_boxed(Arc::new(tool));
    }

    /// Register an already-boxed tool.
    pub fn add_boxed(&mut self, tool: BoxedTool) {
        self.tools.insert(tool.descriptor().name.clone(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    /// Check whether a tool is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the tool box is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Collect the descriptors of every registered tool, e.g. to advertise
    /// them to the LLM or to feed the scheduler.
    #[must_use]
    pub fn descriptors(&self) -> HashMap<String, ToolDescriptor> {
        self.tools
            .values()
            .map(|t| {
                let descriptor = t.descriptor();
                (descriptor.name.clone(), descriptor)
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The result of executing one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// The call this result answers.
    pub tool_call_id: String,
    /// Name of the tool that was invoked.
    pub tool_name: String,
    /// Arguments the call carried.
    pub arguments: Value,
    /// The tool's return value on success, or an error description.
    pub result: Value,
    /// How long the call took to run.
    pub duration: std::time::Duration,
    /// Whether `result` holds an error description rather than output.
    pub is_error: bool,
    /// Error message, set iff `is_error` is `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolExecutionResult {
    fn ok(call: &ToolCall, result: Value, duration: std::time::Duration) -> Self {
        Self {
            tool_call_id: call.tool_call_id.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
            result,
            duration,
            is_error: false,
            error: None,
        }
    }

    fn err(call: &ToolCall, message: String, duration: std::time::Duration) -> Self {
        Self {
            tool_call_id: call.tool_call_id.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
            result: Value::String(message.clone()),
            duration,
            is_error: true,
            error: Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("echo", "Echoes the input", serde_json::json!({}))
        }

        async fn run(&self, arguments: Value) -> std::result::Result<Value, String> {
            Ok(arguments)
        }
    }

    #[test]
    fn tool_box_registers_and_finds_tools() {
        let mut tools = ToolBox::new();
        tools.add(EchoTool);

        assert_eq!(tools.len(), 1);
        assert!(tools.contains("echo"));
        assert!(!tools.contains("missing"));
        assert_eq!(tools.descriptors().len(), 1);
    }

    #[test]
    fn ordered_tool_call_derefs_to_call() {
        let call = ToolCall::new("c1", "echo", serde_json::json!({}));
        let ordered = OrderedToolCall::with_after(call, vec!["c0".to_owned()]);
        assert_eq!(ordered.tool_call_id, "c1");
        assert_eq!(ordered.after, vec!["c0".to_owned()]);
    }
}
