//! Graph builder and scheduler/executor for the Troupe workflow engine.
//!
//! [`ExecutionGraph::build`] assembles agent configurations into a directed
//! execution graph for one of two communication patterns; [`WorkflowEngine`]
//! walks that graph turn by turn, committing message deltas to a single
//! [`WorkflowState`](troupe_core::WorkflowState), checkpointing after every
//! committed turn, and enforcing turn budgets, completion signals and
//! cooperative cancellation.

/// The scheduler/executor.
pub mod engine;
/// Graph construction and validation.
pub mod graph;
/// Per-agent run metrics.
pub mod metrics;

pub use engine::{run_workflow, CancelHandle, RunOutcome, WorkflowEngine, DEFAULT_COMPLETION_MARKER};
pub use graph::{CommunicationPattern, ExecutionGraph};
pub use metrics::{AgentTotals, RunMetrics};
