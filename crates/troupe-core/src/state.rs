//! The mutable workflow state aggregate.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default turn budget when run metadata does not set `max_turns`.
pub const DEFAULT_MAX_TURNS: u32 = 20;

/// Lifecycle state of a workflow run.
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`; terminal states
/// are absorbing. Exhausting the turn budget is an expected outcome and
/// yields `Completed` with the truncation flag set, never `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Built but not yet driven.
    Pending,
    /// The engine is advancing turns.
    Running,
    /// A terminal condition was reached.
    Completed {
        /// True when the run ended by exhausting its turn budget rather
        /// than by an explicit completion signal.
        truncated: bool,
    },
    /// A critical-role agent failed unrecoverably, or validation failed
    /// mid-run.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// An external cancellation request was observed at a turn boundary.
    Cancelled,
}

impl WorkflowStatus {
    /// True for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Pending | WorkflowStatus::Running)
    }
}

/// The mutable aggregate for one workflow run.
///
/// Exactly one `WorkflowState` exists per run and it is owned exclusively
/// by the engine for the run's duration. The message list is append-only;
/// [`append`](Self::append) is the single commit point and stamps each
/// message's logical sequence number.
///
/// The state owns all of its substructure, so `Clone` produces a structural
/// deep copy — the basis of the checkpoint snapshot guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// Ordered, append-only conversation history.
    pub messages: Vec<Message>,
    /// Number of committed turns. Starts at 0.
    pub turn_count: u32,
    /// Name(s) of the agent(s) whose turn is next — a single name under the
    /// sequential pattern, the resolved fan-out set under broadcast.
    pub active_agents: Vec<String>,
    /// Run lifecycle state.
    pub status: WorkflowStatus,
    /// Run-scoped configuration (`max_turns`, `completion_marker`, ...).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowState {
    /// Creates a fresh state for a new run.
    pub fn new(metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            messages: Vec::new(),
            turn_count: 0,
            active_agents: Vec::new(),
            status: WorkflowStatus::Pending,
            metadata,
        }
    }

    /// Appends a batch of messages as one atomic commit, stamping each with
    /// the next logical sequence number.
    pub fn append(&mut self, messages: Vec<Message>) {
        let mut seq = self.messages.len() as u64;
        for mut msg in messages {
            msg.created_at = seq;
            seq += 1;
            self.messages.push(msg);
        }
    }

    /// Commits a full turn: appends the turn's delta, advances the turn
    /// counter, and records who acts next.
    pub fn commit_turn(&mut self, delta: Vec<Message>, next_active: Vec<String>) {
        self.append(delta);
        self.turn_count += 1;
        self.active_agents = next_active;
    }

    /// The run's turn budget, from metadata (default [`DEFAULT_MAX_TURNS`]).
    pub fn max_turns(&self) -> u32 {
        self.metadata
            .get("max_turns")
            .and_then(serde_json::Value::as_u64)
            .map_or(DEFAULT_MAX_TURNS, |v| v as u32)
    }

    /// The most recent non-error agent message, if any.
    pub fn last_agent_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::Agent && !m.is_error())
    }

    /// Number of messages in the history.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
