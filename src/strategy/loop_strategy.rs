//! The `loop` strategy (§4.1.1): the simplest iteration discipline.
//!
//! One LLM call per outer iteration, over the full message history each
//! time. Termination is driven by the model itself declining further tool
//! calls, or an optional iteration cap — the provider may run its own
//! internal tool loop inside a single `generate`, so one outer iteration
//! is the common case.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::event::UapEventType;
use crate::turn::Turn;

use super::{AgentResult, AgentStreamResult, Emitter, ExecutionContext, NoopEmitter, Strategy, run_llm_turn, spawn_stream, uap};

/// Drives the LLM in a single outer loop until it stops requesting tools
/// or `max_iterations` is reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStrategy {
    /// Iteration cap; `None` means unbounded.
    pub max_iterations: Option<u64>,
}

impl LoopStrategy {
    /// An unbounded `loop` strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of outer iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    async fn run(&self, mut ctx: ExecutionContext, emitter: &impl Emitter) -> Result<AgentResult> {
        ctx.state = ctx.state.with_messages(ctx.input.clone());

        let mut iterations: u64 = 0;
        let mut last_turn: Option<Turn> = None;

        loop {
            if ctx.is_aborted() {
                let error = AgentError::Aborted;
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }

            iterations += 1;
            let step = ctx.state.step + 1;
            ctx.state = ctx.state.with_step(step);
            ctx.hooks.on_step_start(step, &ctx.state).await;
            emitter.emit(uap(UapEventType::StepStart, step, &ctx.agent_id, Value::Null));

            let window = ctx.state.messages.clone();
            let turn = match run_llm_turn(&ctx, window, emitter).await {
                Ok(turn) => turn,
                Err(error) => {
                    ctx.hooks.on_error(&error, &ctx.state).await;
                    return Err(error);
                }
            };
            ctx.state = ctx.state.with_messages(turn.messages.clone());

            if turn.response.has_tool_calls() {
                ctx.hooks.on_act(step, &turn.response.tool_calls).await;
                emitter.emit(uap(
                    UapEventType::Action,
                    step,
                    &ctx.agent_id,
                    serde_json::json!({ "toolCalls": turn.response.tool_calls.len() }),
                ));
            }
            if !turn.tool_executions.is_empty() {
                ctx.hooks.on_observe(step, &turn.tool_executions).await;
                emitter.emit(uap(
                    UapEventType::Observation,
                    step,
                    &ctx.agent_id,
                    serde_json::json!({ "count": turn.tool_executions.len() }),
                ));
            }

            ctx.hooks.on_step_end(step, &turn, &ctx.state).await;
            emitter.emit(uap(UapEventType::StepEnd, step, &ctx.agent_id, Value::Null));
            ctx.save_checkpoint(&ctx.state);

            let stop_condition = ctx.hooks.stop_condition(&ctx.state);
            let model_is_done = !turn.response.has_tool_calls();
            let reached_cap = self.max_iterations.is_some_and(|max| iterations >= max);

            last_turn = Some(turn);

            if stop_condition || model_is_done || reached_cap {
                break;
            }
        }

        let turn = last_turn.ok_or(AgentError::NoTurnGenerated)?;
        let result = AgentResult {
            turn,
            state: ctx.state.clone(),
        };
        ctx.hooks.on_complete(&result).await;
        Ok(result)
    }
}

#[async_trait]
impl Strategy for LoopStrategy {
    fn name(&self) -> &'static str {
        "loop"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<AgentResult> {
        self.run(ctx, &NoopEmitter).await
    }

    fn stream(&self, mut ctx: ExecutionContext) -> AgentStreamResult {
        let token = ctx.signal.clone().unwrap_or_default();
        ctx.signal = Some(token.clone());
        let strategy = *self;
        spawn_stream(token, move |emitter| async move { strategy.run(ctx, &*emitter).await })
    }
}
