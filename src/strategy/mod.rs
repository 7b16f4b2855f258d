//! Execution strategies (C4): `loop`, `react`, `plan`.
//!
//! Each strategy is a value with a `name`, an `execute` entry point
//! returning a batched [`AgentResult`], and a `stream` entry point
//! returning an [`AgentStreamResult`]. Both entry points share one
//! iteration procedure per strategy, parameterised over an [`Emitter`]
//! capability: `execute` drives it with [`NoopEmitter`] and awaits the
//! terminal result directly; `stream` drives it on a spawned task behind
//! [`ChannelEmitter`], replaying events through a channel and resolving the
//! terminal result through a oneshot. This is the single place the
//! per-step logic is written, rather than once per entry point.
//!
//! Tool-result propagation is local: a tool that returns `Err` becomes an
//! `isError:true` [`crate::tool::ToolExecutionResult`] fed back to the LLM,
//! never an [`AgentError`]. Every other error surfaces: it fires
//! [`StrategyHooks::on_error`] here, then propagates so the agent facade's
//! middleware `onError` chain gets a chance to recover it (see
//! [`crate::middleware`]).

pub mod loop_strategy;
pub mod plan;
pub mod react;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::cancel::CancellationToken;
use crate::checkpoint::BoxedCheckpointStore;
use crate::error::{AgentError, Result};
use crate::event::{Event, UapEvent, UapEventType};
use crate::llm::{BoxedLlm, GenerateOptions, GenerateResponse, StreamAggregator};
use crate::message::Message;
use crate::state::State;
use crate::tool::{OrderedToolCall, ToolBox, ToolCall, ToolExecutionResult, execute_ordered_tool_calls};
use crate::turn::{Response, Turn};

pub use loop_strategy::LoopStrategy;
pub use plan::PlanStrategy;
pub use react::ReactStrategy;

/// Everything a strategy needs for one execution.
///
/// Constructed fresh by [`crate::agent::Agent`] for each call to `generate`
/// or `stream`; cheap to clone (the LLM handle, tool box, and hooks are all
/// shared via `Arc`).
#[derive(Clone)]
pub struct ExecutionContext {
    /// The owning agent's id.
    pub agent_id: String,
    /// The agent's system prompt, if any.
    pub system: Option<String>,
    /// The LLM handle to drive.
    pub llm: BoxedLlm,
    /// The normalized input for this execution.
    pub input: Vec<Message>,
    /// The state to resume from.
    pub state: State,
    /// Tools available to the LLM.
    pub tools: ToolBox,
    /// Strategy lifecycle hooks.
    pub hooks: Arc<dyn StrategyHooks>,
    /// Cooperative cancellation signal.
    pub signal: Option<CancellationToken>,
    /// Checkpoint collaborator, if configured.
    pub checkpoints: Option<BoxedCheckpointStore>,
    /// Session id used to key checkpoint saves.
    pub session_id: Option<String>,
}

impl ExecutionContext {
    fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn save_checkpoint(&self, state: &State) {
        let (Some(store), Some(session_id)) = (self.checkpoints.clone(), self.session_id.clone()) else {
            return;
        };
        let snapshot = state.to_json();
        tokio::spawn(async move {
            if let Err(error) = store.save(&session_id, snapshot).await {
                tracing::warn!(session_id, error, "checkpoint save failed");
            }
        });
    }
}

/// The result of a completed execution: the final [`Turn`] and the [`State`]
/// it was absorbed into.
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// The last turn produced.
    pub turn: Turn,
    /// The state after absorbing every turn in the execution.
    pub state: State,
}

/// Strategy lifecycle hooks (§4.1). Every method is optional; the default
/// implementation is a no-op so callers only override what they need.
#[async_trait]
pub trait StrategyHooks: Send + Sync {
    /// Fired at the start of each step, before the LLM is invoked.
    async fn on_step_start(&self, _step: u64, _state: &State) {}

    /// Fired at the end of each step.
    async fn on_step_end(&self, _step: u64, _turn: &Turn, _state: &State) {}

    /// Fired when the model requested tool invocation.
    async fn on_act(&self, _step: u64, _tool_calls: &[ToolCall]) {}

    /// Fired when tool execution results are available.
    async fn on_observe(&self, _step: u64, _tool_executions: &[ToolExecutionResult]) {}

    /// Fired once, when the execution terminates successfully.
    async fn on_complete(&self, _result: &AgentResult) {}

    /// Fired when a surfaced error occurs, before it propagates.
    async fn on_error(&self, _error: &AgentError, _state: &State) {}

    /// Evaluated at the end of each step; `true` terminates the execution
    /// regardless of strategy-specific termination conditions.
    fn stop_condition(&self, _state: &State) -> bool {
        false
    }
}

/// Hooks that do nothing; the default for executions that supply none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl StrategyHooks for NoopHooks {}

/// A handle to a streaming execution: an event sequence, a result future,
/// and an abort primitive.
pub struct AgentStreamResult {
    events: Pin<Box<dyn Stream<Item = Result<Event>> + Send>>,
    result_rx: Option<oneshot::Receiver<Result<AgentResult>>>,
    abort_token: CancellationToken,
}

impl AgentStreamResult {
    pub(crate) fn new(
        events: Pin<Box<dyn Stream<Item = Result<Event>> + Send>>,
        result_rx: oneshot::Receiver<Result<AgentResult>>,
        abort_token: CancellationToken,
    ) -> Self {
        Self {
            events,
            result_rx: Some(result_rx),
            abort_token,
        }
    }

    /// Request cancellation; in-flight work observes it at the next
    /// suspension point or iteration boundary.
    pub fn abort(&self) {
        self.abort_token.cancel();
    }

    /// Await the terminal `{turn, state}` once the event stream ends.
    ///
    /// # Errors
    ///
    /// Returns the execution's error, including [`AgentError::Aborted`] if
    /// [`Self::abort`] was called before a result was produced.
    pub async fn result(&mut self) -> Result<AgentResult> {
        match self.result_rx.take() {
            Some(rx) => rx.await.unwrap_or(Err(AgentError::Aborted)),
            None => Err(AgentError::Aborted),
        }
    }

    /// Decompose into the raw event stream, result receiver, and abort
    /// token, so the agent facade can weave middleware around the result
    /// handle while passing the event sequence through untouched.
    pub(crate) fn into_parts(
        self,
    ) -> (
        Pin<Box<dyn Stream<Item = Result<Event>> + Send>>,
        oneshot::Receiver<Result<AgentResult>>,
        CancellationToken,
    ) {
        let result_rx = self.result_rx.unwrap_or_else(|| {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(Err(AgentError::Aborted));
            rx
        });
        (self.events, result_rx, self.abort_token)
    }
}

impl Stream for AgentStreamResult {
    type Item = Result<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.events.as_mut().poll_next(cx)
    }
}

/// A strategy: one iteration discipline over the LLM/tool feedback cycle.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// The strategy's name, e.g. `"loop"`.
    fn name(&self) -> &'static str;

    /// Run to completion and return the aggregated result.
    async fn execute(&self, ctx: ExecutionContext) -> Result<AgentResult>;

    /// Run, emitting events as they occur.
    fn stream(&self, ctx: ExecutionContext) -> AgentStreamResult;
}

/// Where a step's events go: nowhere (batched `execute`), or a channel
/// (`stream`).
pub(crate) trait Emitter: Send + Sync {
    fn emit(&self, event: Event);
}

pub(crate) struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn emit(&self, _event: Event) {}
}

pub(crate) struct ChannelEmitter {
    tx: mpsc::UnboundedSender<Result<Event>>,
}

impl ChannelEmitter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Result<Event>>) -> Self {
        Self { tx }
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, event: Event) {
        let _ = self.tx.send(Ok(event));
    }
}

pub(crate) fn uap(event_type: UapEventType, step: u64, agent_id: &str, data: serde_json::Value) -> Event {
    Event::uap(UapEvent::new(event_type, step, agent_id, data))
}

/// Spawn `run` (the strategy's emitter-parameterised iteration procedure)
/// on a background task and wire its events/result into an
/// [`AgentStreamResult`]. Shared by every strategy's `stream` entry point.
pub(crate) fn spawn_stream<F, Fut>(signal: CancellationToken, run: F) -> AgentStreamResult
where
    F: FnOnce(Arc<ChannelEmitter>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<AgentResult>> + Send + 'static,
{
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (result_tx, result_rx) = oneshot::channel();
    let emitter = Arc::new(ChannelEmitter::new(event_tx));

    tokio::spawn(async move {
        let outcome = run(emitter).await;
        let _ = result_tx.send(outcome);
    });

    let events = Box::pin(futures::stream::unfold(event_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    AgentStreamResult::new(events, result_rx, signal)
}

/// Drive the LLM on `window` through [`crate::llm::Llm::generate_stream`],
/// forwarding every UPP chunk through `emitter` as it arrives and folding
/// the chunks back into a [`GenerateResponse`] via [`StreamAggregator`].
///
/// `execute` calls this with a [`NoopEmitter`] (the chunks are still
/// streamed and aggregated, just never observed), so both entry points
/// drive the same provider call pattern — only whether anyone is listening
/// differs. Shared by every phase that needs a bare generation with no
/// tool round-trip: the `react` strategy's reasoning phase and the
/// planning call's caller.
pub(crate) async fn run_llm_stream(
    ctx: &ExecutionContext,
    window: Vec<Message>,
    options: GenerateOptions,
    emitter: &impl Emitter,
) -> Result<GenerateResponse> {
    let mut chunks = ctx.llm.generate_stream(window, options).await?;
    let mut aggregator = StreamAggregator::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        aggregator.apply(&chunk);
        emitter.emit(Event::upp(chunk));
    }
    Ok(aggregator.into_response())
}

/// Invoke the LLM on `window`, execute any resulting tool calls through the
/// scheduler, and package the whole cycle as a [`Turn`].
///
/// Shared by every strategy phase that performs "one LLM call, possibly
/// followed by tool execution" — the `loop` strategy's single phase, the
/// `react` strategy's action phase, and the `plan` strategy's per-step
/// execution call.
pub(crate) async fn run_llm_turn(ctx: &ExecutionContext, window: Vec<Message>, emitter: &impl Emitter) -> Result<Turn> {
    let descriptors = ctx.tools.descriptors().into_values().collect();
    let options = GenerateOptions::new().with_tools(descriptors);
    let generated = run_llm_stream(ctx, window, options, emitter).await?;

    let assistant_message = generated.message;
    let response = Response {
        text: assistant_message.text_content(),
        tool_calls: assistant_message.tool_calls.clone().unwrap_or_default(),
        data: None,
    };

    let mut messages = vec![assistant_message];
    let mut tool_executions = Vec::new();

    if response.has_tool_calls() {
        let ordered: Vec<OrderedToolCall> = response
            .tool_calls
            .iter()
            .cloned()
            .map(OrderedToolCall::new)
            .collect();
        tool_executions = execute_ordered_tool_calls(&ordered, &ctx.tools).await;
        for execution in &tool_executions {
            let text = if execution.is_error {
                execution.error.clone().unwrap_or_default()
            } else {
                execution.result.to_string()
            };
            messages.push(Message::tool(execution.tool_call_id.clone(), text));
        }
    }

    Ok(Turn::new(response, messages, generated.usage).with_tool_executions(tool_executions))
}
