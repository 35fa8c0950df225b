//! Echo tool: returns its `text` argument unchanged.

use async_trait::async_trait;
use troupe_core::{ToolCall, ToolResult, TroupeResult};
use troupe_tools::{Tool, ToolDescriptor};

/// Returns the `text` argument verbatim. Useful for wiring and tests.
pub struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    /// Creates the echo tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "echo".to_string(),
                description: "Echo the given text back unchanged.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The text to echo"
                        }
                    },
                    "required": ["text"]
                }),
            },
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> TroupeResult<ToolResult> {
        match call.arguments["text"].as_str() {
            Some(text) => Ok(ToolResult::success(&call.id, text)),
            None => Ok(ToolResult::error(&call.id, "Missing 'text' argument")),
        }
    }
}
