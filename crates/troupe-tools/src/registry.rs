//! Central registry for all available tools.

use crate::tool::{Tool, ToolDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};
use troupe_core::{ToolCall, ToolResult};

/// Default per-call timeout for tool execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Central registry for all available tools.
///
/// Execution is total: unknown tools, denied capabilities, timeouts and
/// tool errors all come back as an error [`ToolResult`], never as a crash
/// of the calling turn.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    /// Creates an empty registry with the default per-call timeout.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Creates an empty registry with a custom per-call timeout.
    pub fn with_timeout(call_timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            call_timeout,
        }
    }

    /// Registers a tool under its descriptor name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Descriptors for the subset of tools an agent is allowed to invoke,
    /// in allowlist order.
    pub fn descriptors_for(&self, allowed: &[String]) -> Vec<ToolDescriptor> {
        allowed
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.descriptor().clone())
            .collect()
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Executes a tool call on behalf of an agent, checking the agent's
    /// capability allowlist first and bounding the call with the registry
    /// timeout.
    pub async fn execute(&self, call: ToolCall, allowed: &[String]) -> ToolResult {
        if !allowed.contains(&call.name) {
            warn!(tool = %call.name, "Tool not in agent allowlist");
            return ToolResult::error(
                &call.id,
                format!("Capability denied: tool '{}' is not allowed for this agent", call.name),
            );
        }

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        let call_id = call.id.clone();
        let name = call.name.clone();
        match timeout(self.call_timeout, tool.invoke(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                ToolResult::error(&call_id, format!("Tool '{name}' failed: {e}"))
            }
            Err(_) => {
                let timeout_ms = self.call_timeout.as_millis() as u64;
                warn!(tool = %name, timeout_ms, "Tool call timed out");
                ToolResult::error(
                    &call_id,
                    format!("Tool '{}' timed out after {}ms", name, self.call_timeout.as_millis()),
                )
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
