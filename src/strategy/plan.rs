//! The `plan` strategy (§4.1.3): plan, then execute steps in dependency
//! order.
//!
//! Phase 1 asks the LLM for a plan and decodes it; phase 2 truncates it to
//! `max_plan_steps`; phase 3 repeatedly runs the next step whose
//! dependencies are all `completed`, one LLM call per step, until no
//! pending step remains or every remaining pending step is blocked
//! (`plan_stuck`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::event::UapEventType;
use crate::message::Message;
use crate::state::{PlanStep, PlanStepStatus};
use crate::turn::{Response, Turn};

use super::{AgentResult, AgentStreamResult, Emitter, ExecutionContext, NoopEmitter, Strategy, run_llm_turn, spawn_stream, uap};

/// Drives a plan-then-execute cycle: one planning call, then one LLM call
/// per dependency-ready plan step.
#[derive(Debug, Clone, Default)]
pub struct PlanStrategy {
    /// Truncate the decoded plan to at most this many steps; `None` means
    /// unbounded.
    pub max_plan_steps: Option<usize>,
    /// Extra instruction appended to the planning call.
    pub planning_prompt: Option<String>,
}

impl PlanStrategy {
    /// An unbounded `plan` strategy with the default planning prompt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of steps kept from the decoded plan.
    #[must_use]
    pub const fn with_max_plan_steps(mut self, max_plan_steps: usize) -> Self {
        self.max_plan_steps = Some(max_plan_steps);
        self
    }

    /// Append an extra instruction to the planning call.
    #[must_use]
    pub fn with_planning_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.planning_prompt = Some(prompt.into());
        self
    }

    async fn run(&self, mut ctx: ExecutionContext, emitter: &impl Emitter) -> Result<AgentResult> {
        ctx.state = ctx.state.with_messages(ctx.input.clone());

        if ctx.is_aborted() {
            let error = AgentError::Aborted;
            ctx.hooks.on_error(&error, &ctx.state).await;
            return Err(error);
        }

        let planning_turn = self.run_planning_phase(&mut ctx, emitter).await?;
        let mut last_turn = planning_turn;

        loop {
            if ctx.hooks.stop_condition(&ctx.state) {
                break;
            }
            if ctx.is_aborted() {
                let error = AgentError::Aborted;
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }

            let plan = ctx.state.plan.clone().unwrap_or_default();
            let Some(index) = next_ready_step(&plan) else {
                if plan.iter().any(|step| step.status == PlanStepStatus::Pending) {
                    let error = AgentError::PlanStuck;
                    ctx.hooks.on_error(&error, &ctx.state).await;
                    return Err(error);
                }
                break;
            };

            last_turn = self.run_step_phase(&mut ctx, emitter, &plan, index).await?;
        }

        let result = AgentResult {
            turn: last_turn,
            state: ctx.state.clone(),
        };
        ctx.hooks.on_complete(&result).await;
        Ok(result)
    }

    async fn run_planning_phase(&self, ctx: &mut ExecutionContext, emitter: &impl Emitter) -> Result<Turn> {
        let step = ctx.state.step + 1;
        ctx.state = ctx.state.with_step(step);
        ctx.hooks.on_step_start(step, &ctx.state).await;
        emitter.emit(uap(UapEventType::StepStart, step, &ctx.agent_id, Value::Null));

        let mut window = ctx.state.messages.clone();
        if let Some(prompt) = &self.planning_prompt {
            window.push(Message::system(prompt.clone()));
        }

        let turn = match run_llm_turn(ctx, window, emitter).await {
            Ok(turn) => turn,
            Err(error) => {
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }
        };
        ctx.state = ctx.state.with_messages(turn.messages.clone());

        let decoded = match decode_plan(&turn.response) {
            Ok(steps) => steps,
            Err(error) => {
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }
        };

        let mut steps = decoded;
        if let Some(max) = self.max_plan_steps {
            steps.truncate(max);
        }
        ctx.state = ctx.state.with_plan(steps.clone());

        ctx.hooks.on_step_end(step, &turn, &ctx.state).await;
        emitter.emit(uap(UapEventType::StepEnd, step, &ctx.agent_id, Value::Null));
        emitter.emit(uap(
            UapEventType::PlanCreated,
            step,
            &ctx.agent_id,
            serde_json::json!({ "steps": steps.len() }),
        ));
        ctx.save_checkpoint(&ctx.state);

        Ok(turn)
    }

    async fn run_step_phase(
        &self,
        ctx: &mut ExecutionContext,
        emitter: &impl Emitter,
        plan: &[PlanStep],
        index: usize,
    ) -> Result<Turn> {
        let step_id = plan[index].id.clone();
        let description = plan[index].description.clone();

        let mut running_plan = plan.to_vec();
        running_plan[index] = running_plan[index].with_status(PlanStepStatus::Running);
        ctx.state = ctx.state.with_plan(running_plan);

        let step = ctx.state.step + 1;
        ctx.state = ctx.state.with_step(step);
        ctx.hooks.on_step_start(step, &ctx.state).await;
        emitter.emit(uap(UapEventType::StepStart, step, &ctx.agent_id, Value::Null));
        emitter.emit(uap(
            UapEventType::PlanStepStart,
            step,
            &ctx.agent_id,
            serde_json::json!({ "stepId": step_id }),
        ));

        let instruction = Message::user(format!("Execute plan step {step_id}: {description}"));
        let mut window = ctx.state.messages.clone();
        window.push(instruction.clone());

        let turn = match run_llm_turn(ctx, window, emitter).await {
            Ok(turn) => turn,
            Err(error) => {
                let mut failed_plan = ctx.state.plan.clone().unwrap_or_default();
                if let Some(failed_step) = failed_plan.get_mut(index) {
                    *failed_step = failed_step.with_status(PlanStepStatus::Failed);
                }
                ctx.state = ctx.state.with_plan(failed_plan);
                ctx.hooks.on_error(&error, &ctx.state).await;
                return Err(error);
            }
        };

        ctx.state = ctx.state.with_message(instruction);
        ctx.state = ctx.state.with_messages(turn.messages.clone());

        let mut completed_plan = ctx.state.plan.clone().unwrap_or_default();
        if let Some(completed_step) = completed_plan.get_mut(index) {
            *completed_step = completed_step.with_status(PlanStepStatus::Completed);
        }
        ctx.state = ctx.state.with_plan(completed_plan);

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
        emitter.emit(uap(
            UapEventType::PlanStepEnd,
            step,
            &ctx.agent_id,
            serde_json::json!({ "stepId": step_id }),
        ));
        ctx.save_checkpoint(&ctx.state);

        Ok(turn)
    }
}

fn next_ready_step(plan: &[PlanStep]) -> Option<usize> {
    plan.iter().position(|step| {
        step.status == PlanStepStatus::Pending
            && step.depends_on.iter().all(|dep| {
                plan.iter()
                    .any(|other| &other.id == dep && other.status == PlanStepStatus::Completed)
            })
    })
}

#[derive(Debug, Deserialize)]
struct PlanResponseShape {
    steps: Vec<PlanStepInput>,
}

#[derive(Debug, Deserialize)]
struct PlanStepInput {
    id: String,
    description: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default, rename = "dependsOn")]
    depends_on: Vec<String>,
}

fn decode_plan(response: &Response) -> Result<Vec<PlanStep>> {
    if let Some(data) = &response.data {
        if let Some(steps) = decode_steps_value(data) {
            return Ok(steps);
        }
    }
    if let Some(value) = scan_for_plan_object(&response.text) {
        if let Some(steps) = decode_steps_value(&value) {
            return Ok(steps);
        }
    }
    Err(AgentError::PlanDecodeError(response.text.clone()))
}

fn decode_steps_value(value: &Value) -> Option<Vec<PlanStep>> {
    let shape: PlanResponseShape = serde_json::from_value(value.clone()).ok()?;
    Some(
        shape
            .steps
            .into_iter()
            .map(|input| {
                let mut step = PlanStep::new(input.id, input.description).with_depends_on(input.depends_on);
                if let Some(tool) = input.tool {
                    step = step.with_tool(tool);
                }
                step
            })
            .collect(),
    )
}

/// Scan `text` for the first balanced `{...}` object containing a `steps`
/// array, per the decoding policy in §4.1.3.
fn scan_for_plan_object(text: &str) -> Option<Value> {
    let starts: Vec<usize> = text
        .char_indices()
        .filter(|&(_, ch)| ch == '{')
        .map(|(i, _)| i)
        .collect();

    for start in starts {
        let Some(end) = find_matching_brace(text, start) else {
            continue;
        };
        let candidate = &text[start..=end];
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.get("steps").and_then(Value::as_array).is_some() {
                return Some(value);
            }
        }
    }
    None
}

fn find_matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in text.char_indices() {
        if i < start {
            continue;
        }
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl Strategy for PlanStrategy {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<AgentResult> {
        self.run(ctx, &NoopEmitter).await
    }

    fn stream(&self, mut ctx: ExecutionContext) -> AgentStreamResult {
        let token = ctx.signal.clone().unwrap_or_default();
        ctx.signal = Some(token.clone());
        let strategy = self.clone();
        spawn_stream(token, move |emitter| async move { strategy.run(ctx, &*emitter).await })
    }
}
