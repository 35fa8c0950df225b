//! The tool trait implemented by every capability an agent may invoke.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use troupe_core::{ToolCall, ToolResult, TroupeResult};

/// Metadata describing a tool's interface.
///
/// The descriptor is what gets surfaced to the model collaborator so it can
/// decide when and how to call the tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Capability identifier, unique within a registry.
    pub name: String,
    /// Human/model-readable description of what the tool does.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters_schema: serde_json::Value,
}

/// Trait that all tools must implement.
///
/// Implementations should return `Ok` with an error [`ToolResult`] for
/// expected failures (bad arguments, remote errors); `Err` is reserved for
/// infrastructure faults and is converted into an error result by the
/// registry anyway.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's interface metadata.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute one invocation.
    async fn invoke(&self, call: ToolCall) -> TroupeResult<ToolResult>;
}
