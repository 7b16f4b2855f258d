//! Full-stack scenarios driven through the [`agentcore::agent::Agent`]
//! facade: building an agent, generating/streaming against it, and
//! confirming hook and middleware wiring end to end.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use agentcore::prelude::*;

struct ScriptedLlm {
    responses: Mutex<VecDeque<Message>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
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

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("echo", "Echoes its input back", json!({}))
    }

    async fn run(&self, arguments: serde_json::Value) -> std::result::Result<serde_json::Value, String> {
        Ok(arguments)
    }
}

#[derive(Default)]
struct CountingHooks {
    step_starts: AtomicUsize,
    step_ends: AtomicUsize,
    completes: AtomicUsize,
}

#[async_trait]
impl StrategyHooks for CountingHooks {
    async fn on_step_start(&self, _step: u64, _state: &State) {
        self.step_starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_step_end(&self, _step: u64, _turn: &Turn, _state: &State) {
        self.step_ends.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_complete(&self, _result: &AgentResult) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn loop_agent_with_one_tool_round_trip() {
    let llm = ScriptedLlm::new(vec![
        Message::assistant_tool_calls("calling echo", vec![ToolCall::new("c1", "echo", json!({"x": 1}))]),
        Message::assistant("done"),
    ]);

    let agent = Agent::builder().llm(llm).tool(EchoTool).build().unwrap();

    let result = agent.generate("hello", State::initial()).await.unwrap();

    assert_eq!(result.turn.response.text, "done");
    assert_eq!(result.state.step, 2);
    // user message, assistant tool-call message, tool result, final assistant message
    assert_eq!(result.state.messages.len(), 4);
}

#[tokio::test]
async fn loop_agent_reports_hook_counts_across_two_iterations() {
    let llm = ScriptedLlm::new(vec![
        Message::assistant_tool_calls("go", vec![ToolCall::new("c1", "echo", json!({}))]),
        Message::assistant("final"),
    ]);

    let hooks = Arc::new(CountingHooks::default());
    let agent = Agent::builder()
        .llm(llm)
        .tool(EchoTool)
        .hooks(CountingHooksHandle(hooks.clone()))
        .build()
        .unwrap();

    agent.generate("hi", State::initial()).await.unwrap();

    assert_eq!(hooks.step_starts.load(Ordering::SeqCst), 2);
    assert_eq!(hooks.step_ends.load(Ordering::SeqCst), 2);
    assert_eq!(hooks.completes.load(Ordering::SeqCst), 1);
}

struct CountingHooksHandle(Arc<CountingHooks>);

#[async_trait]
impl StrategyHooks for CountingHooksHandle {
    async fn on_step_start(&self, step: u64, state: &State) {
        self.0.on_step_start(step, state).await;
    }

    async fn on_step_end(&self, step: u64, turn: &Turn, state: &State) {
        self.0.on_step_end(step, turn, state).await;
    }

    async fn on_complete(&self, result: &AgentResult) {
        self.0.on_complete(result).await;
    }
}

#[tokio::test]
async fn max_iterations_one_stops_even_with_pending_tool_calls() {
    let llm = ScriptedLlm::new(vec![Message::assistant_tool_calls(
        "go",
        vec![ToolCall::new("c1", "echo", json!({}))],
    )]);

    let agent = Agent::builder()
        .llm(llm)
        .tool(EchoTool)
        .strategy(LoopStrategy::new().with_max_iterations(1))
        .build()
        .unwrap();

    let result = agent.generate("hi", State::initial()).await.unwrap();
    assert_eq!(result.state.step, 1);
    assert!(result.turn.response.has_tool_calls());
}

#[tokio::test]
async fn react_agent_runs_one_cycle_end_to_end() {
    let llm = ScriptedLlm::new(vec![Message::assistant("thinking"), Message::assistant("final answer")]);

    let agent = Agent::builder().llm(llm).strategy(ReactStrategy::new()).build().unwrap();

    let result = agent.generate("what's the answer?", State::initial()).await.unwrap();

    assert_eq!(result.state.reasoning, vec!["thinking".to_owned()]);
    assert_eq!(result.turn.response.text, "final answer");
}

#[tokio::test]
async fn plan_agent_completes_three_dependent_steps() {
    let plan_text = json!({
        "steps": [
            {"id": "A", "description": "gather"},
            {"id": "B", "description": "analyze"},
            {"id": "C", "description": "report", "dependsOn": ["A", "B"]},
        ]
    })
    .to_string();

    let llm = ScriptedLlm::new(vec![
        Message::assistant(plan_text),
        Message::assistant("gathered"),
        Message::assistant("analyzed"),
        Message::assistant("reported"),
    ]);

    let agent = Agent::builder().llm(llm).strategy(PlanStrategy::new()).build().unwrap();

    let result = agent.generate("produce a report", State::initial()).await.unwrap();

    let plan = result.state.plan.unwrap();
    assert_eq!(plan.len(), 3);
    assert!(plan.iter().all(|step| step.status == PlanStepStatus::Completed));
}

struct TagMiddleware(&'static str);

#[async_trait]
impl Middleware for TagMiddleware {
    async fn before(&self, ctx: ExecutionContext) -> Result<ExecutionContext> {
        let mut ctx = ctx;
        ctx.state = ctx.state.with_metadata(self.0, true);
        Ok(ctx)
    }
}

#[tokio::test]
async fn generate_runs_middleware_before_the_strategy_sees_the_context() {
    let llm = ScriptedLlm::new(vec![Message::assistant("ok")]);

    let agent = Agent::builder()
        .llm(llm)
        .middleware(TagMiddleware("tagged"))
        .build()
        .unwrap();

    let result = agent.generate("hi", State::initial()).await.unwrap();
    assert_eq!(result.turn.response.text, "ok");
}

struct RecoverOnError;

#[async_trait]
impl Middleware for RecoverOnError {
    async fn on_error(&self, _ctx: &ExecutionContext, _error: &AgentError) -> Option<AgentResult> {
        Some(AgentResult {
            turn: Turn::new(Response::text("recovered"), Vec::new(), Usage::zero()),
            state: State::initial(),
        })
    }
}

struct FailingLlm;

#[async_trait]
impl Llm for FailingLlm {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _messages: Vec<Message>, _options: GenerateOptions) -> Result<GenerateResponse> {
        Err(AgentError::PlanDecodeError("boom".to_owned()))
    }
}

#[tokio::test]
async fn on_error_middleware_recovers_a_failed_execution() {
    let agent = Agent::builder()
        .llm(FailingLlm)
        .middleware(RecoverOnError)
        .build()
        .unwrap();

    let result = agent.generate("hi", State::initial()).await.unwrap();
    assert_eq!(result.turn.response.text, "recovered");
}

#[tokio::test]
async fn stream_and_generate_agree_on_final_state() {
    let generate_llm = ScriptedLlm::new(vec![Message::assistant("answer")]);
    let stream_llm = ScriptedLlm::new(vec![Message::assistant("answer")]);

    let generate_agent = Agent::builder().llm(generate_llm).build().unwrap();
    let stream_agent = Agent::builder().llm(stream_llm).build().unwrap();

    let generated = generate_agent.generate("hi", State::initial()).await.unwrap();

    let mut stream = stream_agent.stream("hi", State::initial()).await.unwrap();
    while stream.next().await.is_some() {}
    let streamed = stream.result().await.unwrap();

    assert!(generated.state.structurally_equivalent(&streamed.state));
}

#[tokio::test]
async fn query_returns_only_the_turn() {
    let llm = ScriptedLlm::new(vec![Message::assistant("quick answer")]);
    let agent = Agent::builder().llm(llm).build().unwrap();

    let turn = agent.query("ping").await.unwrap();
    assert_eq!(turn.response.text, "quick answer");
}

#[tokio::test]
async fn checkpoints_persist_the_final_state_under_the_session_id() {
    let llm = ScriptedLlm::new(vec![Message::assistant("ok")]);
    let store = Arc::new(InMemoryCheckpointStore::new());

    let agent = Agent::builder()
        .llm(llm)
        .checkpoints(InMemoryCheckpointStoreHandle(store.clone()))
        .build()
        .unwrap();

    let result = agent.generate("hi", State::initial()).await.unwrap();
    let session_id = result.state.metadata.get("sessionId").and_then(serde_json::Value::as_str).unwrap();

    // checkpoint saves are fire-and-forget; yield so the spawned task runs.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    assert!(store.get(session_id).is_some());
}

struct InMemoryCheckpointStoreHandle(Arc<InMemoryCheckpointStore>);

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStoreHandle {
    async fn save(&self, session_id: &str, snapshot: serde_json::Value) -> std::result::Result<(), String> {
        self.0.save(session_id, snapshot).await
    }
}

struct ChunkedLlm;

#[async_trait]
impl Llm for ChunkedLlm {
    fn model_id(&self) -> &str {
        "chunked"
    }

    async fn generate(&self, _messages: Vec<Message>, _options: GenerateOptions) -> Result<GenerateResponse> {
        Ok(GenerateResponse::new(Message::assistant("Hello world")))
    }

    async fn generate_stream(&self, _messages: Vec<Message>, _options: GenerateOptions) -> Result<LlmStream> {
        let chunks = vec![
            Ok(StreamChunk::Text("Hello ".to_owned())),
            Ok(StreamChunk::Text("world".to_owned())),
            Ok(StreamChunk::Usage(Usage::new(3, 2))),
            Ok(StreamChunk::Done),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

#[tokio::test]
async fn stream_forwards_upp_chunks_before_the_step_ends() {
    let agent = Agent::builder().llm(ChunkedLlm).build().unwrap();

    let mut stream = agent.stream("hi", State::initial()).await.unwrap();
    let mut saw_upp_text = false;
    let mut step_ended = false;

    while let Some(event) = stream.next().await {
        match event.unwrap() {
            Event::Upp { upp: StreamChunk::Text(text) } => {
                assert!(!step_ended, "UPP chunks must precede the step's UAP step_end");
                if text == "Hello " || text == "world" {
                    saw_upp_text = true;
                }
            }
            Event::Uap { uap } if uap.event_type == UapEventType::StepEnd => {
                step_ended = true;
            }
            _ => {}
        }
    }

    assert!(saw_upp_text, "expected at least one passthrough text chunk");
    let result = stream.result().await.unwrap();
    assert_eq!(result.turn.response.text, "Hello world");
    assert_eq!(result.turn.usage, Usage::new(3, 2));
}
