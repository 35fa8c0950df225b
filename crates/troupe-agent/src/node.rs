//! Agent configuration and the agent node.

use crate::backend::{ModelBackend, ModelReply};
use crate::config::ModelConfig;
use crate::openai::OpenAiCompatibleBackend;
use crate::retry::RetryingBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use troupe_core::{Message, ToolCall, TroupeResult};
use troupe_tools::ToolDescriptor;

/// Role of an agent within a workflow.
///
/// Roles are semantic markers consumed by the graph builder (the
/// coordinator anchors both topologies) and by the default criticality
/// rule; the scheduler itself is role-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Manages the workflow, delegates, and synthesizes results.
    Coordinator,
    /// Performs concrete tasks or actions.
    Executor,
    /// Reviews other agents' output and provides feedback.
    Reviewer,
    /// Domain specialist with a narrow focus.
    Specialist,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Coordinator => write!(f, "coordinator"),
            AgentRole::Executor => write!(f, "executor"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Specialist => write!(f, "specialist"),
        }
    }
}

fn default_max_tool_rounds() -> u32 {
    4
}

/// Static configuration for one agent. Immutable after workflow construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name, unique within a workflow.
    pub name: String,
    /// The agent's role.
    pub role: AgentRole,
    /// Instructions handed to the model collaborator on every step.
    pub system_message: String,
    /// Capability identifiers this agent may invoke.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Opaque model parameters passed to the backend.
    pub model: ModelConfig,
    /// Whether this agent's unrecoverable failure fails the whole run.
    /// Defaults to true for the Coordinator role, false otherwise.
    #[serde(default)]
    pub critical: Option<bool>,
    /// Bound on the within-turn tool loop.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

impl AgentConfig {
    /// Creates a config with defaults for the optional fields.
    pub fn new(name: impl Into<String>, role: AgentRole, system_message: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            name: name.into(),
            role,
            system_message: system_message.into(),
            tools: Vec::new(),
            model,
            critical: None,
            max_tool_rounds: default_max_tool_rounds(),
        }
    }

    /// Sets the tool allowlist, builder style.
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    /// Overrides the criticality flag, builder style.
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Effective criticality: explicit flag, else role default.
    pub fn is_critical(&self) -> bool {
        self.critical
            .unwrap_or(matches!(self.role, AgentRole::Coordinator))
    }
}

/// The result of one agent step.
#[derive(Debug)]
pub enum StepReply {
    /// A turn-ending agent message.
    Message(Message),
    /// Tool requests that must be resolved before the turn can end.
    ToolRequests {
        /// Text the agent emitted alongside the requests, if any.
        message: Option<Message>,
        /// The requested invocations, in order.
        calls: Vec<ToolCall>,
    },
}

/// Wraps one agent's configuration and model backend behind a single
/// `step` operation.
///
/// A node never mutates workflow state; it reads a message-history view
/// and returns a delta for the scheduler to commit.
pub struct AgentNode {
    config: AgentConfig,
    backend: Arc<dyn ModelBackend>,
}

impl AgentNode {
    /// Creates a node over an explicit backend (tests inject mocks here).
    pub fn new(config: AgentConfig, backend: Arc<dyn ModelBackend>) -> Self {
        Self { config, backend }
    }

    /// Creates a node whose backend is built from the config's model
    /// parameters: an OpenAI-compatible HTTP client wrapped in the retry
    /// policy.
    pub fn from_config(config: AgentConfig) -> Self {
        let policy = config.model.retry_policy.clone().unwrap_or_default();
        let inner = OpenAiCompatibleBackend::new(config.model.clone());
        let backend = Arc::new(RetryingBackend::new(Box::new(inner), policy));
        Self { config, backend }
    }

    /// The agent's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The agent's configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Effective criticality of this agent.
    pub fn is_critical(&self) -> bool {
        self.config.is_critical()
    }

    /// Produce the agent's next contribution given the conversation so far.
    ///
    /// `history` is a read-only view of committed messages plus any
    /// turn-local messages the scheduler has accumulated; `tools` is the
    /// descriptor set for this agent's allowlist. Model failures arrive
    /// here only after the retry policy is exhausted.
    pub async fn step(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> TroupeResult<StepReply> {
        info!(agent = %self.config.name, role = %self.config.role, history_len = history.len(), "Agent step");

        let reply = self
            .backend
            .invoke(Some(&self.config.system_message), history, tools)
            .await?;

        Ok(match reply {
            ModelReply::Text(text) => StepReply::Message(Message::agent(&self.config.name, text)),
            ModelReply::ToolUse { content, tool_calls } => StepReply::ToolRequests {
                message: content.map(|c| {
                    Message::agent(&self.config.name, c).with_tool_calls(tool_calls.clone())
                }),
                calls: tool_calls,
            },
        })
    }
}
