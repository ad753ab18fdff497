//! Turns of a call and the per-call history.

use crate::tool::ToolResult;
use callhandler_ai::{LlmMessage, ToolInvocation};
use callhandler_core::MessageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The person on the phone.
    Caller,
    /// The model.
    Assistant,
    /// Outcome of a tool invocation.
    Tool,
}

/// One entry in a call's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Position in the history, assigned on append.
    pub sequence: u64,
    /// Message role.
    pub role: MessageRole,
    /// Message content.
    pub content: String,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Tool invocations requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    /// Tool result carried by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sequence: 0,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_result: None,
        }
    }

    /// Creates a caller message.
    #[must_use]
    pub fn caller(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Caller, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Creates an assistant message requesting tool invocations.
    #[must_use]
    pub fn assistant_tool_calls(tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            tool_calls,
            ..Self::new(MessageRole::Assistant, "")
        }
    }

    /// Creates a tool result message.
    #[must_use]
    pub fn tool(result: ToolResult) -> Self {
        Self {
            tool_result: Some(result),
            ..Self::new(MessageRole::Tool, "")
        }
    }

    /// Returns true if this message has tool calls.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Converts to the message format sent to the model.
    #[must_use]
    pub fn to_llm(&self) -> LlmMessage {
        match self.role {
            MessageRole::Caller => LlmMessage::user(&self.content),
            MessageRole::Assistant if self.has_tool_calls() => {
                LlmMessage::assistant_tool_calls(self.tool_calls.clone())
            }
            MessageRole::Assistant => LlmMessage::assistant(&self.content),
            MessageRole::Tool => match &self.tool_result {
                Some(result) => LlmMessage::tool(&result.correlation_id, result.model_content()),
                None => LlmMessage::tool("", &self.content),
            },
        }
    }
}

/// Append-only record of one call.
///
/// Messages cannot be changed once appended; sequence numbers grow by one
/// per message starting at zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its sequence number.
    pub fn append(&mut self, mut message: Message) -> u64 {
        let sequence = self.messages.len() as u64;
        message.sequence = sequence;
        self.messages.push(message);
        sequence
    }

    /// Returns every message, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns whether nothing has been said yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns messages with the given role.
    pub fn with_role(&self, role: MessageRole) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    /// Returns the trailing slice sent to the model.
    ///
    /// At most `max_messages` messages, cut so the slice starts at a caller
    /// message and never separates tool results from the request that
    /// produced them. When no caller message fits, the slice starts at the
    /// latest caller message regardless of length.
    #[must_use]
    pub fn window(&self, max_messages: usize) -> &[Message] {
        if self.messages.len() <= max_messages {
            return &self.messages;
        }

        let start = self.messages.len() - max_messages;
        let offset = self.messages[start..]
            .iter()
            .position(|m| m.role == MessageRole::Caller)
            .map(|offset| start + offset)
            .or_else(|| {
                self.messages
                    .iter()
                    .rposition(|m| m.role == MessageRole::Caller)
            })
            .unwrap_or(start);

        &self.messages[offset..]
    }
}
