//! The immutable conversational/reasoning/plan snapshot strategies advance.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;

/// Lifecycle of a single [`PlanStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStepStatus {
    /// Not yet attempted.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// One element of a decoded plan (see the `plan` strategy, §4.1.3).
///
/// `depends_on` must reference only earlier step ids; `status` transitions
/// monotonically along `pending -> running -> {completed, failed}` — callers
/// should not construct a regression, though this type does not itself
/// enforce it (enforcement lives in the `plan` strategy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Identifier for this step, unique within its plan.
    pub id: String,
    /// Human-readable description of the step's intent.
    pub description: String,
    /// Tool this step is expected to invoke, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Ids of steps that must be `completed` before this one is eligible.
    #[serde(default)]
    pub depends_on: HashSet<String>,
    /// Current lifecycle status.
    pub status: PlanStepStatus,
}

impl PlanStep {
    /// Create a new, `pending` plan step.
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool: None,
            depends_on: HashSet::new(),
            status: PlanStepStatus::Pending,
        }
    }

    /// Attach a tool to this step.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Set this step's dependencies.
    #[must_use]
    pub fn with_depends_on(mut self, depends_on: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = depends_on.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a copy of this step with `status` replaced.
    #[must_use]
    pub fn with_status(&self, status: PlanStepStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// An immutable conversational/reasoning/plan snapshot.
///
/// Every `with_*` operation returns a new `State`; the receiver is never
/// mutated. Two states are **structurally equivalent** — see
/// [`State::structurally_equivalent`] — iff they agree on `step`, message
/// count, the full `reasoning` sequence, and plan length/presence; identity
/// fields such as `metadata["sessionId"]` are excluded from that comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// Conversation so far, in order.
    pub messages: Vec<Message>,
    /// Monotonically non-decreasing step counter.
    pub step: u64,
    /// Reasoning-trace strings captured across steps (e.g. by `react`).
    pub reasoning: Vec<String>,
    /// Decoded plan, once the `plan` strategy has produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<PlanStep>>,
    /// Free-form metadata; conventionally carries `agentId` and `sessionId`.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl State {
    /// The empty starting state: no messages, step `0`, no reasoning, no
    /// plan, no metadata.
    #[must_use]
    pub fn initial() -> Self {
        Self::default()
    }

    /// Append one message.
    #[must_use]
    pub fn with_message(&self, message: Message) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self {
            messages,
            ..self.clone()
        }
    }

    /// Append several messages.
    #[must_use]
    pub fn with_messages(&self, new_messages: impl IntoIterator<Item = Message>) -> Self {
        let mut messages = self.messages.clone();
        messages.extend(new_messages);
        Self {
            messages,
            ..self.clone()
        }
    }

    /// Replace the step counter.
    #[must_use]
    pub fn with_step(&self, step: u64) -> Self {
        Self {
            step,
            ..self.clone()
        }
    }

    /// Set a metadata key.
    #[must_use]
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert(key.into(), value.into());
        Self {
            metadata,
            ..self.clone()
        }
    }

    /// Append one reasoning-trace string.
    #[must_use]
    pub fn with_reasoning(&self, reasoning: impl Into<String>) -> Self {
        let mut trace = self.reasoning.clone();
        trace.push(reasoning.into());
        Self {
            reasoning: trace,
            ..self.clone()
        }
    }

    /// Replace the plan wholesale.
    #[must_use]
    pub fn with_plan(&self, plan: Vec<PlanStep>) -> Self {
        Self {
            plan: Some(plan),
            ..self.clone()
        }
    }

    /// Serialize this state to the JSON layout in §6: `{messages, step,
    /// reasoning, plan?, metadata}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rehydrate a state from its [`State::to_json`] representation.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `value` does not match the state
    /// JSON layout.
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Whether `self` and `other` are structurally equivalent: same `step`,
    /// same message count, the same `reasoning` sequence, and agreeing
    /// plan length/presence. Identity fields (message contents beyond
    /// count, metadata) are excluded.
    #[must_use]
    pub fn structurally_equivalent(&self, other: &Self) -> bool {
        self.step == other.step
            && self.messages.len() == other.messages.len()
            && self.reasoning == other.reasoning
            && self.plan.as_ref().map(Vec::len) == other.plan.as_ref().map(Vec::len)
    }
}
