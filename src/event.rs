//! The event protocol (C3): provider events passed through verbatim,
//! runtime events describing strategy lifecycle.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::StreamChunk;

/// The kind of a runtime-level ([`Event::Uap`]) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UapEventType {
    /// A strategy step began.
    StepStart,
    /// A strategy step concluded.
    StepEnd,
    /// The model requested tool invocation.
    Action,
    /// Tool execution results are available.
    Observation,
    /// The `plan` strategy decoded a plan.
    PlanCreated,
    /// A plan step began executing.
    PlanStepStart,
    /// A plan step finished.
    PlanStepEnd,
    /// A subagent invocation began.
    SubagentStart,
    /// An event was emitted by a running subagent.
    SubagentInner,
    /// A subagent invocation concluded.
    SubagentEnd,
}

/// A runtime-level event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UapEvent {
    /// The event's kind.
    #[serde(rename = "type")]
    pub event_type: UapEventType,
    /// The strategy step this event belongs to.
    pub step: u64,
    /// Id of the agent emitting this event.
    pub agent_id: String,
    /// Event-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl UapEvent {
    /// Create a new UAP event.
    #[must_use]
    pub fn new(event_type: UapEventType, step: u64, agent_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            step,
            agent_id: agent_id.into(),
            data,
        }
    }
}

/// An element of a strategy's event stream: either a provider event passed
/// through untouched, or a runtime event describing strategy lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Event {
    /// A provider-level event, opaque to the runtime.
    Upp {
        /// The underlying provider chunk.
        upp: StreamChunk,
    },
    /// A runtime-level event.
    Uap {
        /// The event.
        uap: UapEvent,
    },
}

impl Event {
    /// Wrap a provider chunk as a passthrough event.
    #[must_use]
    pub const fn upp(chunk: StreamChunk) -> Self {
        Self::Upp { upp: chunk }
    }

    /// Wrap a runtime event.
    #[must_use]
    pub const fn uap(event: UapEvent) -> Self {
        Self::Uap { uap: event }
    }
}
