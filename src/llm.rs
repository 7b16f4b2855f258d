//! The boundary between the runtime and a language model provider.
//!
//! [`Llm`] is deliberately narrow: one call in, one response out, plus a
//! default streaming wrapper built on top of it. Concrete providers (an
//! OpenAI-compatible HTTP client, a local model, a test double) live
//! outside this crate and implement the trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::ToolDescriptor;
use crate::usage::Usage;

/// Parameters for a single generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sequences that stop generation when produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl GenerateOptions {
    /// An empty set of options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `tools` to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max-tokens cap.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set stop sequences.
    #[must_use]
    pub fn with_stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.stop_sequences = Some(sequences);
        self
    }
}

/// Result of a single generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated message (may carry tool calls).
    pub message: Message,
    /// Token usage for this call, if the provider reports it.
    #[serde(default)]
    pub usage: Usage,
}

impl GenerateResponse {
    /// Create a new response with zero usage.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: Usage::zero(),
        }
    }

    /// Attach usage to this response.
    #[must_use]
    pub const fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// An incremental piece of a streamed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StreamChunk {
    /// A piece of assistant text.
    Text(String),
    /// A tool call has started; arguments arrive as [`Self::ToolCallDelta`].
    ToolCallStart {
        /// Index of the call within the eventual message's `tool_calls`.
        index: usize,
        /// The call's id.
        id: String,
        /// The tool being called.
        name: String,
    },
    /// A fragment of a tool call's JSON arguments.
    ToolCallDelta {
        /// Index of the call being extended.
        index: usize,
        /// Raw JSON fragment.
        partial_json: String,
    },
    /// Usage for the call, typically emitted once near the end.
    Usage(Usage),
    /// The stream is complete.
    Done,
}

/// A boxed stream of [`StreamChunk`]s.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// The model-provider boundary.
///
/// Implementors need only provide [`Llm::generate`]; [`Llm::generate_stream`]
/// has a default that calls it once and replays the result as a two-chunk
/// stream (text, then usage, then done). Providers capable of true
/// token-level streaming should override it.
#[async_trait]
pub trait Llm: Send + Sync {
    /// An identifier for the underlying model, for logging and diagnostics.
    fn model_id(&self) -> &str;

    /// Generate a response for `messages`.
    async fn generate(&self, messages: Vec<Message>, options: GenerateOptions) -> Result<GenerateResponse>;

    /// Generate a response, streaming incremental chunks as they arrive.
    async fn generate_stream(&self, messages: Vec<Message>, options: GenerateOptions) -> Result<LlmStream> {
        let response = self.generate(messages, options).await?;
        let text = response.message.text_content();
        let mut chunks = Vec::with_capacity(3);
        if !text.is_empty() {
            chunks.push(Ok(StreamChunk::Text(text)));
        }
        if let Some(tool_calls) = &response.message.tool_calls {
            for (index, call) in tool_calls.iter().enumerate() {
                chunks.push(Ok(StreamChunk::ToolCallStart {
                    index,
                    id: call.tool_call_id.clone(),
                    name: call.tool_name.clone(),
                }));
                chunks.push(Ok(StreamChunk::ToolCallDelta {
                    index,
                    partial_json: call.arguments.to_string(),
                }));
            }
        }
        chunks.push(Ok(StreamChunk::Usage(response.usage)));
        chunks.push(Ok(StreamChunk::Done));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// A boxed, shared [`Llm`].
pub type BoxedLlm = std::sync::Arc<dyn Llm>;

/// Rebuilds a complete [`GenerateResponse`] from a sequence of [`StreamChunk`]s.
///
/// Every strategy phase drives the model through [`Llm::generate_stream`]
/// rather than [`Llm::generate`] directly so that UPP events are available
/// to forward to a stream consumer; this is what turns the raw chunks back
/// into the `{message, usage}` shape the rest of the runtime expects.
/// Grounded on `machi/src/stream.rs`'s `StreamAggregator`.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    text: String,
    tool_calls: std::collections::BTreeMap<usize, PartialToolCall>,
    usage: Usage,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl StreamAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the running accumulation.
    pub fn apply(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Text(text) => self.text.push_str(text),
            StreamChunk::ToolCallStart { index, id, name } => {
                self.tool_calls.insert(
                    *index,
                    PartialToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
            }
            StreamChunk::ToolCallDelta { index, partial_json } => {
                if let Some(call) = self.tool_calls.get_mut(index) {
                    call.arguments.push_str(partial_json);
                }
            }
            StreamChunk::Usage(usage) => self.usage = *usage,
            StreamChunk::Done => {}
        }
    }

    /// Consume the aggregator, producing the final [`GenerateResponse`].
    ///
    /// A tool call whose accumulated `arguments` never parsed as JSON falls
    /// back to `Value::Null` rather than dropping the call outright.
    #[must_use]
    pub fn into_response(self) -> GenerateResponse {
        let tool_calls: Vec<crate::tool::ToolCall> = self
            .tool_calls
            .into_values()
            .map(|call| {
                let arguments = serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Null);
                crate::tool::ToolCall::new(call.id, call.name, arguments)
            })
            .collect();

        let message = if tool_calls.is_empty() {
            Message::assistant(self.text)
        } else {
            Message::assistant_tool_calls(self.text, tool_calls)
        };

        GenerateResponse::new(message).with_usage(self.usage)
    }
}
