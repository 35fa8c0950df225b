//! The model collaborator seam.

use async_trait::async_trait;
use troupe_core::{Message, ToolCall, TroupeResult};
use troupe_tools::ToolDescriptor;

/// Reply from the model — either a plain message or a tool-use request.
#[derive(Debug, Clone)]
pub enum ModelReply {
    /// A text message that ends the agent's turn.
    Text(String),
    /// A request to invoke one or more tools before the turn can end.
    ToolUse {
        /// Text emitted alongside the tool request, if any.
        content: Option<String>,
        /// The requested invocations, in order.
        tool_calls: Vec<ToolCall>,
    },
}

/// Abstraction over a chat model provider.
///
/// Contract: send the agent's instructions plus the prior message history,
/// receive a new message or a tool-invocation request. Implementations
/// surface failures as [`TroupeError::Model`](troupe_core::TroupeError) or
/// [`TroupeError::Http`](troupe_core::TroupeError); transient-failure retry
/// is layered on by [`RetryingBackend`](crate::RetryingBackend), not done
/// here.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One model invocation.
    async fn invoke(
        &self,
        system_message: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply>;
}
