//! The agent facade (C6): binds an LLM, tools, a strategy, middleware, and
//! checkpoints into one addressable unit.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::checkpoint::BoxedCheckpointStore;
use crate::error::{AgentError, Result};
use crate::llm::{BoxedLlm, Llm};
use crate::message::Message;
use crate::middleware::{Middleware, MiddlewarePipeline};
use crate::state::State;
use crate::strategy::{AgentResult, AgentStreamResult, ExecutionContext, LoopStrategy, NoopHooks, Strategy, StrategyHooks};
use crate::tool::Tool;
use crate::turn::Turn;

/// Input to [`Agent::generate`]/[`Agent::stream`]: a plain string
/// (normalized to a single user message) or an explicit message list.
#[derive(Debug, Clone)]
pub enum AgentInput {
    /// Plain text, normalized to one user message.
    Text(String),
    /// An explicit, already-formed message list.
    Messages(Vec<Message>),
}

impl AgentInput {
    fn normalize(self) -> Vec<Message> {
        match self {
            Self::Text(text) => vec![Message::user(text)],
            Self::Messages(messages) => messages,
        }
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for AgentInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Message> for AgentInput {
    fn from(message: Message) -> Self {
        Self::Messages(vec![message])
    }
}

impl From<Vec<Message>> for AgentInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

/// Binds a model, tools, strategy, middleware, and checkpoints into one
/// addressable unit with a stable, UUIDv4 `id`.
pub struct Agent {
    /// This agent's id, generated once at build time.
    pub id: String,
    system: Option<String>,
    llm: BoxedLlm,
    tools: crate::tool::ToolBox,
    strategy: Arc<dyn Strategy>,
    middleware: MiddlewarePipeline,
    checkpoints: Option<BoxedCheckpointStore>,
    hooks: Arc<dyn StrategyHooks>,
}

impl Agent {
    /// Start building an agent.
    #[must_use]
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Normalize `input`, run `middleware.before`, delegate to the
    /// strategy's `execute`, then run `middleware.after` — falling back to
    /// the `onError` chain if the strategy failed.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error if no middleware layer recovers it.
    pub async fn generate(&self, input: impl Into<AgentInput>, state: State) -> Result<AgentResult> {
        let ctx = self.build_context(input.into().normalize(), state, None);
        let ctx = self.middleware.run_before(ctx).await?;

        match self.strategy.execute(ctx.clone()).await {
            Ok(result) => self.middleware.run_after(&ctx, result).await,
            Err(error) => self.middleware.run_on_error(&ctx, error).await,
        }
    }

    /// Same contract as [`Agent::generate`], but delegates to the
    /// strategy's `stream` and weaves middleware around its event sequence
    /// and result handle: `before` resolves before the first event is
    /// emitted, `after`/`onError` resolve before the result handle does.
    /// The event sequence itself passes through untouched.
    ///
    /// # Errors
    ///
    /// Returns `middleware.before`'s error directly, without invoking the
    /// strategy or the `onError` chain.
    pub async fn stream(&self, input: impl Into<AgentInput>, state: State) -> Result<AgentStreamResult> {
        let ctx = self.build_context(input.into().normalize(), state, None);
        let ctx = self.middleware.run_before(ctx).await?;

        let (events, result_rx, abort_token) = self.strategy.stream(ctx.clone()).into_parts();
        let middleware = self.middleware.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let outcome = match result_rx.await {
                Ok(Ok(result)) => middleware.run_after(&ctx, result).await,
                Ok(Err(error)) => middleware.run_on_error(&ctx, error).await,
                Err(_) => Err(AgentError::Aborted),
            };
            let _ = tx.send(outcome);
        });

        Ok(AgentStreamResult::new(events, rx, abort_token))
    }

    /// Delegates to [`Agent::generate`]; the strategy alone is responsible
    /// for appending the input and response to state.
    ///
    /// # Errors
    ///
    /// See [`Agent::generate`].
    pub async fn ask(&self, input: impl Into<AgentInput>, state: State) -> Result<AgentResult> {
        self.generate(input, state).await
    }

    /// Convenience wrapper: calls [`Agent::generate`] with [`State::initial`]
    /// and returns only the resulting [`Turn`].
    ///
    /// # Errors
    ///
    /// See [`Agent::generate`].
    pub async fn query(&self, input: impl Into<AgentInput>) -> Result<Turn> {
        self.generate(input, State::initial()).await.map(|result| result.turn)
    }

    fn build_context(&self, input: Vec<Message>, mut state: State, signal: Option<CancellationToken>) -> ExecutionContext {
        let session_id = self.checkpoints.is_some().then(|| {
            let existing = state
                .metadata
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_owned);
            existing.unwrap_or_else(|| Uuid::new_v4().to_string())
        });

        if let Some(session_id) = &session_id {
            state = state.with_metadata("sessionId", session_id.clone());
        }
        state = state.with_metadata("agentId", self.id.clone());

        ExecutionContext {
            agent_id: self.id.clone(),
            system: self.system.clone(),
            llm: self.llm.clone(),
            input,
            state,
            tools: self.tools.clone(),
            hooks: self.hooks.clone(),
            signal,
            checkpoints: self.checkpoints.clone(),
            session_id,
        }
    }
}

/// Builds an [`Agent`]. Only an LLM is required; everything else has a
/// sensible default (unbounded `loop` strategy, no tools, no middleware,
/// no checkpoints, no hooks).
#[derive(Default)]
pub struct AgentBuilder {
    id: Option<String>,
    system: Option<String>,
    llm: Option<BoxedLlm>,
    tools: crate::tool::ToolBox,
    strategy: Option<Arc<dyn Strategy>>,
    middleware: MiddlewarePipeline,
    checkpoints: Option<BoxedCheckpointStore>,
    hooks: Option<Arc<dyn StrategyHooks>>,
}

impl AgentBuilder {
    /// Set a fixed id instead of generating a UUIDv4 one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the LLM handle.
    #[must_use]
    pub fn llm(mut self, llm: impl Llm + 'static) -> Self {
        self.llm = Some(Arc::new(llm));
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.add(tool);
        self
    }

    /// Set the execution strategy. Defaults to an unbounded `loop`.
    #[must_use]
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Append a middleware layer.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware = self.middleware.with(middleware);
        self
    }

    /// Configure checkpoint persistence.
    #[must_use]
    pub fn checkpoints(mut self, checkpoints: impl crate::checkpoint::CheckpointStore + 'static) -> Self {
        self.checkpoints = Some(Arc::new(checkpoints));
        self
    }

    /// Set strategy hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl StrategyHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Finish building the agent.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if no LLM was set.
    pub fn build(self) -> Result<Agent> {
        let llm = self
            .llm
            .ok_or_else(|| AgentError::configuration("agent requires an llm"))?;

        Ok(Agent {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            system: self.system,
            llm,
            tools: self.tools,
            strategy: self.strategy.unwrap_or_else(|| Arc::new(LoopStrategy::new())),
            middleware: self.middleware,
            checkpoints: self.checkpoints,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoopHooks)),
        })
    }
}
