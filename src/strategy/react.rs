//! The `react` strategy (§4.1.2): alternating reasoning and action calls.
//!
//! Each ReAct step is two LLM calls: a reasoning call whose text is
//! captured into `state.reasoning`, then an action call whose messages and
//! tool calls are absorbed normally. `state.step` advances once per ReAct
//! step, not once per LLM call.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::event::UapEventType;
use crate::llm::GenerateOptions;
use crate::turn::Turn;

use super::{
    AgentResult, AgentStreamResult, Emitter, ExecutionContext, NoopEmitter, Strategy, run_llm_stream, run_llm_turn,
    spawn_stream, uap,
};

/// Drives alternating reasoning/action LLM calls until the action phase
/// stops requesting tools or `max_steps` ReAct steps have run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReactStrategy {
    /// ReAct step cap; `None` means unbounded.
    pub max_steps: Option<u64>,
}

impl ReactStrategy {
    /// An unbounded `react` strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of ReAct steps.
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    async fn run(&self, mut ctx: ExecutionContext, emitter: &impl Emitter) -> Result<AgentResult> {
        ctx.state = ctx.state.with_messages(ctx.input.clone());

        let mut react_steps: u64 = 0;
        let mut last_turn: Option<Turn> = None;

        loop {
            if ctx.is_aborted() {
                let error = AgentError::Aborted;
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }

            react_steps += 1;
            let step = ctx.state.step + 1;
            ctx.state = ctx.state.with_step(step);
            ctx.hooks.on_step_start(step, &ctx.state).await;
            emitter.emit(uap(UapEventType::StepStart, step, &ctx.agent_id, Value::Null));

            let reasoning_window = ctx.state.messages.clone();
            let reasoning = match run_llm_stream(&ctx, reasoning_window, GenerateOptions::new(), emitter).await {
                Ok(response) => response,
                Err(error) => {
                    ctx.hooks.on_error(&error, &ctx.state).await;
                    return Err(error);
                }
            };
            let reasoning_text = reasoning.message.text_content();
            ctx.state = ctx.state.with_reasoning(reasoning_text);

            let action_window = ctx.state.messages.clone();
            let mut turn = match run_llm_turn(&ctx, action_window, emitter).await {
                Ok(turn) => turn,
                Err(error) => {
                    ctx.hooks.on_error(&error, &ctx.state).await;
                    return Err(error);
                }
            };
            turn.usage += reasoning.usage;
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
            let action_is_done = !turn.response.has_tool_calls();
            let reached_cap = self.max_steps.is_some_and(|max| react_steps >= max);

            last_turn = Some(turn);

            if stop_condition || action_is_done || reached_cap {
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
impl Strategy for ReactStrategy {
    fn name(&self) -> &'static str {
        "react"
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::{GenerateResponse, Llm};
    use crate::message::Message;
    use crate::state::State;
    use crate::tool::ToolBox;

    struct ScriptedLlm {
        responses: std::sync::Mutex<std::collections::VecDeque<Message>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Message>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl Llm for ScriptedLlm {
        fn model_id(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _messages: Vec<Message>, _options: GenerateOptions) -> Result<GenerateResponse> {
            let message = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted LLM ran out of responses");
            Ok(GenerateResponse::new(message))
        }
    }

    #[tokio::test]
    async fn one_cycle_captures_reasoning_and_final_answer() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Message::assistant("Thinking..."),
            Message::assistant("Final"),
        ]));
        let ctx = ExecutionContext {
            agent_id: "agent-1".to_owned(),
            system: None,
            llm,
            input: vec![Message::user("hi")],
            state: State::initial(),
            tools: ToolBox::new(),
            hooks: Arc::new(super::super::NoopHooks),
            signal: None,
            checkpoints: None,
            session_id: None,
        };

        let result = ReactStrategy::new().execute(ctx).await.unwrap();

        assert_eq!(result.state.reasoning, vec!["Thinking...".to_owned()]);
        assert_eq!(result.turn.response.text, "Final");
        assert_eq!(result.state.step, 1);
    }
}
