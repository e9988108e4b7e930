//! Chat messages exchanged with the completion provider.
//!
//! A [`ChatMessage`] covers all four roles of the OpenAI-compatible wire
//! format: plain system/user turns, assistant turns that may carry tool-call
//! requests, and tool-result turns that answer a specific call id. The same
//! type is used for serializing requests and deserializing responses, so a
//! provider message can be appended to the conversation verbatim.

use serde::{Deserialize, Serialize};

/// One role-tagged turn in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender role; use the constants on [`ChatMessage`].
    pub role: String,
    /// Text content. Assistant turns that only request tool calls carry none.
    pub content: Option<String>,
    /// Tool calls requested by an assistant turn.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// For tool-result turns: the id of the call being answered.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt message role.
    pub const SYSTEM: &'static str = "system";
    /// Tool-result message role.
    pub const TOOL: &'static str = "tool";

    /// Creates a plain text message with the given role.
    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates a tool-result message answering the call with `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Self::TOOL.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Returns true when the message requests at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty())
    }
}

/// A tool call requested by the assistant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back on the tool-result turn.
    pub id: String,
    /// Call kind discriminator; currently always `"function"`.
    #[serde(rename = "type", default = "default_call_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_call_kind() -> String {
    "function".to_string()
}

/// The function half of a tool call: a name plus JSON-encoded arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON string exactly as the model produced it. May be malformed;
    /// callers degrade to an empty argument set rather than failing.
    #[serde(default)]
    pub arguments: String,
}
