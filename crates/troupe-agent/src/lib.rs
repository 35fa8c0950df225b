//! Agent node and model-collaborator interface for the Troupe engine.
//!
//! An [`AgentNode`] wraps one agent's configuration and a [`ModelBackend`]
//! and exposes a single [`step`](AgentNode::step) operation: given the
//! conversation history, produce the next message or a set of tool
//! requests. Model failures are retried with exponential backoff by
//! [`RetryingBackend`] before they ever reach the scheduler.

/// The model backend trait and reply type.
pub mod backend;
/// Agent and model configuration.
pub mod config;
/// The agent node.
pub mod node;
/// OpenAI-compatible HTTP backend.
pub mod openai;
/// Retry policy and retrying backend wrapper.
pub mod retry;

pub use backend::{ModelBackend, ModelReply};
pub use config::{ModelConfig, ModelProvider};
pub use node::{AgentConfig, AgentNode, AgentRole, StepReply};
pub use openai::OpenAiCompatibleBackend;
pub use retry::{RetryPolicy, RetryingBackend};
