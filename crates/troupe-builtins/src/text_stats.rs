//! Text statistics tool: line, word and declaration counts.

use async_trait::async_trait;
use troupe_core::{ToolCall, ToolResult, TroupeResult};
use troupe_tools::{Tool, ToolDescriptor};

/// Computes basic metrics over a text payload.
///
/// Reports line and word counts plus a rough count of function/class
/// declarations, which is enough for a reviewer agent to talk about the
/// shape of a code submission without a real parser.
pub struct TextStatsTool {
    descriptor: ToolDescriptor,
}

impl TextStatsTool {
    /// Creates the stats tool.
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "text_stats".to_string(),
                description: "Compute line, word and declaration counts for a text.".to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The text to analyze"
                        }
                    },
                    "required": ["text"]
                }),
            },
        }
    }
}

impl Default for TextStatsTool {
    fn default() -> Self {
        Self::new()
    }
}

fn declaration_count(text: &str) -> usize {
    text.lines()
        .map(str::trim_start)
        .filter(|line| {
            line.starts_with("fn ")
                || line.starts_with("pub fn ")
                || line.starts_with("def ")
                || line.starts_with("class ")
                || line.starts_with("struct ")
                || line.starts_with("pub struct ")
        })
        .count()
}

#[async_trait]
impl Tool for TextStatsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> TroupeResult<ToolResult> {
        let Some(text) = call.arguments["text"].as_str() else {
            return Ok(ToolResult::error(&call.id, "Missing 'text' argument"));
        };

        let stats = serde_json::json!({
            "lines": text.lines().count(),
            "words": text.split_whitespace().count(),
            "chars": text.chars().count(),
            "declarations": declaration_count(text),
        });

        Ok(ToolResult::success(&call.id, stats.to_string()))
    }
}
