//! Events produced by the reasoning loop.
//!
//! One query yields one ordered, append-only sequence of these. Delivered
//! events are never revoked or reordered; the consumer sees exactly what the
//! loop did, as it did it. The serialized form doubles as the wire contract
//! for the server-sent-events endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of the reasoning loop, tagged for the stream consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The loop is about to call the model.
    Thinking { step: usize, message: String },
    /// The model requested a tool call.
    ToolCall {
        step: usize,
        tool: String,
        arguments: Value,
    },
    /// A tool finished; `result` is a client-facing summary, never the full
    /// payload fed back to the model.
    ToolResult {
        step: usize,
        tool: String,
        result: Value,
    },
    /// Pending restore actions for the external executor.
    Action {
        action: String,
        urls: Vec<String>,
        count: usize,
    },
    /// Terminal answer. `truncated` marks step-budget exhaustion.
    Answer {
        content: String,
        steps_used: usize,
        #[serde(default, skip_serializing_if = "is_false")]
        truncated: bool,
    },
    /// Terminal failure of the reasoning step itself.
    Error { message: String },
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl AgentEvent {
    /// Discriminator string, matching the serialized `type` field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Action { .. } => "action",
            AgentEvent::Answer { .. } => "answer",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// Renders the event as one server-sent-events frame.
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
