//! Error types for the agent execution runtime.

use thiserror::Error;

/// A type alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// The error type produced by strategies, the scheduler, and the agent
/// facade.
///
/// Tool-result errors (`ToolNotFound`, `ToolError`) are normally packaged
/// into a [`crate::tool::ToolExecutionResult`] rather than surfaced through
/// this type — see the propagation policy in the module docs of
/// [`crate::strategy`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// The execution was cancelled via its abort signal.
    #[error("execution aborted")]
    Aborted,

    /// A strategy terminated without producing a [`crate::state::Turn`].
    #[error("strategy terminated without producing a turn")]
    NoTurnGenerated,

    /// The `plan` strategy's planning call did not decode to `{steps: [...]}`.
    #[error("could not decode plan response: {0}")]
    PlanDecodeError(String),

    /// No pending plan step has all of its dependencies satisfied.
    #[error("plan is stuck: no pending step has satisfied dependencies")]
    PlanStuck,

    /// A tool call referenced a name absent from the tool table.
    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    /// A tool runner returned an error.
    #[error("tool '{name}' failed: {message}")]
    ToolError {
        /// Name of the tool that failed.
        name: String,
        /// The underlying error message.
        message: String,
    },

    /// The agent facade has no model configured.
    #[error("agent configuration error: {0}")]
    Configuration(String),

    /// Pass-through error from the LLM provider.
    #[error("llm error: {0}")]
    Llm(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl AgentError {
    /// Create a new [`AgentError::ToolError`].
    #[must_use]
    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new [`AgentError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns `true` for [`AgentError::Aborted`].
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
