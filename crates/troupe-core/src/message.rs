//! Immutable message records and tool-call types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata key marking a message as the run's terminal signal.
pub const FINAL_KEY: &str = "final";
/// Metadata key marking a message as an error record.
pub const ERROR_KEY: &str = "error";

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human end-user who seeded the run.
    User,
    /// A configured agent.
    Agent,
    /// A system-level instruction or note.
    System,
    /// Output produced by a tool invocation (a tool result).
    Tool,
}

/// A request to invoke a specific tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the model for this tool call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// The outcome of executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// A single message within a workflow run.
///
/// Once appended to a run's history a message is never mutated or removed.
/// `created_at` is a logical sequence number stamped by
/// [`WorkflowState::append`](crate::WorkflowState::append) at commit time;
/// it increases monotonically within a run and is `0` until committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// Name of the agent that produced the message, or `"user"`.
    pub sender: String,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// Tool invocations requested by this message, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Logical sequence number within the run, stamped at commit.
    pub created_at: u64,
    /// UTC wall-clock timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary key-value metadata attached to the message.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message with the given role, sender and content.
    pub fn new(role: Role, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            created_at: 0,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a user message (sender `"user"`).
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, "user", content)
    }

    /// Creates an agent message.
    pub fn agent(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Agent, sender, content)
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, "system", content)
    }

    /// Creates a tool-result message attributed to the agent whose turn
    /// produced the tool call.
    pub fn tool_result(sender: impl Into<String>, call: &ToolCall, result: &ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, sender, result.content.clone());
        msg.metadata
            .insert("call_id".into(), serde_json::json!(result.call_id));
        msg.metadata.insert("tool".into(), serde_json::json!(call.name));
        if result.is_error {
            msg.metadata.insert(ERROR_KEY.into(), serde_json::json!(true));
        }
        msg
    }

    /// Attaches a metadata entry, builder style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attaches tool-call requests, builder style.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// The explicit completion predicate: true iff this message carries the
    /// terminal tag. The engine tags a message final before commit when its
    /// content contains the run's completion marker.
    pub fn is_final(&self) -> bool {
        self.metadata
            .get(FINAL_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// True iff this message records a failure (model or tool error).
    pub fn is_error(&self) -> bool {
        self.metadata
            .get(ERROR_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
