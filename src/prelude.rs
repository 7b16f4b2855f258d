//! The common import set: `use agentcore::prelude::*;`.

pub use crate::agent::{Agent, AgentBuilder, AgentInput};
pub use crate::cancel::CancellationToken;
pub use crate::checkpoint::{BoxedCheckpointStore, CheckpointStore, InMemoryCheckpointStore};
pub use crate::error::{AgentError, Result};
pub use crate::event::{Event, UapEvent, UapEventType};
pub use crate::llm::{BoxedLlm, GenerateOptions, GenerateResponse, Llm, LlmStream, StreamChunk};
pub use crate::message::{Message, MessageContent, MessageRole};
pub use crate::middleware::{Middleware, MiddlewarePipeline};
pub use crate::state::{PlanStep, PlanStepStatus, State};
pub use crate::strategy::{
    AgentResult, AgentStreamResult, ExecutionContext, LoopStrategy, NoopHooks, PlanStrategy,
    ReactStrategy, Strategy, StrategyHooks,
};
pub use crate::tool::{
    BoxedTool, OrderedToolCall, Tool, ToolBox, ToolCall, ToolDescriptor, ToolExecutionResult,
};
pub use crate::turn::{Response, Turn};
pub use crate::usage::Usage;
