//! The scheduler/executor: one authoritative state machine per run.

use crate::graph::{CommunicationPattern, ExecutionGraph};
use crate::metrics::RunMetrics;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use troupe_agent::{AgentConfig, AgentNode, StepReply};
use troupe_checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use troupe_core::{
    Message, Role, TroupeError, TroupeResult, WorkflowState, WorkflowStatus, ERROR_KEY, FINAL_KEY,
};
use troupe_tools::ToolRegistry;
use uuid::Uuid;

/// Default content marker that tags a message as the run's completion
/// signal. Overridable per run via metadata key `completion_marker`.
pub const DEFAULT_COMPLETION_MARKER: &str = "WORKFLOW_COMPLETE";

/// Cooperative cancellation flag, checked at turn boundaries only. An
/// in-flight model or tool call is allowed to finish before the run
/// observes cancellation.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an unset handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation at the next turn boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a run returns to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The run's identifier (stable across resume).
    pub run_id: Uuid,
    /// Terminal status.
    pub status: WorkflowStatus,
    /// The complete message history, including error messages.
    pub messages: Vec<Message>,
    /// Content of the last successful agent message.
    pub synthesized_result: String,
    /// Non-fatal problems observed during the run (e.g. checkpoint
    /// persistence failures).
    pub warnings: Vec<String>,
    /// Per-agent execution counters.
    pub metrics: RunMetrics,
}

/// One agent turn's outcome before commit.
struct TurnReport {
    delta: Vec<Message>,
    fatal: Option<String>,
}

/// The multi-agent workflow engine.
///
/// Immutable after construction and safely shared by many concurrent runs;
/// each run owns its own [`WorkflowState`], and turns within a run are
/// strictly serialized. Broadcast fan-out steps may execute in parallel,
/// but their results are always committed in agent-list order.
pub struct WorkflowEngine {
    graph: ExecutionGraph,
    nodes: HashMap<String, Arc<AgentNode>>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl WorkflowEngine {
    /// Builds an engine over explicit agent nodes. Graph validation (name
    /// uniqueness, non-empty list) happens here, before any agent runs.
    pub fn new(
        nodes: Vec<AgentNode>,
        pattern: CommunicationPattern,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> TroupeResult<Self> {
        let configs: Vec<AgentConfig> = nodes.iter().map(|n| n.config().clone()).collect();
        let graph = ExecutionGraph::build(&configs, pattern)?;
        let nodes = nodes
            .into_iter()
            .map(|n| (n.name().to_string(), Arc::new(n)))
            .collect();
        Ok(Self {
            graph,
            nodes,
            tools,
            checkpoints,
        })
    }

    /// Builds an engine whose nodes get HTTP model backends from their
    /// configs.
    pub fn from_configs(
        configs: Vec<AgentConfig>,
        pattern: CommunicationPattern,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> TroupeResult<Self> {
        Self::new(
            configs.into_iter().map(AgentNode::from_config).collect(),
            pattern,
            tools,
            checkpoints,
        )
    }

    /// The engine's execution graph.
    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Runs a workflow from an initial user message.
    pub async fn run(
        &self,
        initial_message: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> TroupeResult<RunOutcome> {
        self.run_cancellable(initial_message, metadata, CancelHandle::new())
            .await
    }

    /// Runs a workflow with an external cancellation handle.
    pub async fn run_cancellable(
        &self,
        initial_message: &str,
        metadata: HashMap<String, serde_json::Value>,
        cancel: CancelHandle,
    ) -> TroupeResult<RunOutcome> {
        let mut state = WorkflowState::new(metadata);
        state.append(vec![Message::user(initial_message)]);
        state.active_agents = vec![self.graph.start().to_string()];
        self.drive(state, cancel).await
    }

    /// Resumes a run from a persisted checkpoint. The continuation picks up
    /// exactly where the snapshot left off; with identical agent responses
    /// it is indistinguishable from an uninterrupted run.
    pub async fn resume(&self, checkpoint_id: Uuid) -> TroupeResult<RunOutcome> {
        let checkpoint = self
            .checkpoints
            .load(checkpoint_id)
            .await?
            .ok_or_else(|| {
                TroupeError::Checkpoint(format!("Unknown checkpoint: {checkpoint_id}"))
            })?;

        let mut state = checkpoint.state;
        for name in &state.active_agents {
            if !self.graph.contains(name) {
                return Err(TroupeError::Config(format!(
                    "Checkpointed agent '{name}' is not part of this workflow"
                )));
            }
        }
        if state.active_agents.is_empty() {
            state.active_agents = vec![self.graph.start().to_string()];
        }

        info!(run_id = %state.run_id, turn = state.turn_count, "Resuming from checkpoint");
        self.drive(state, CancelHandle::new()).await
    }

    /// The turn loop. Exactly one `drive` owns a given state at a time.
    async fn drive(&self, mut state: WorkflowState, cancel: CancelHandle) -> TroupeResult<RunOutcome> {
        state.status = WorkflowStatus::Running;
        let mut warnings = Vec::new();
        let mut metrics = RunMetrics::default();
        let marker = completion_marker(&state);

        info!(
            run_id = %state.run_id,
            pattern = %self.graph.pattern(),
            max_turns = state.max_turns(),
            "Workflow run started"
        );

        // Turn-0 snapshot so the run is resumable from before the first
        // agent turn.
        if state.turn_count == 0 {
            self.save_checkpoint(&state, &mut warnings).await;
        }

        loop {
            if cancel.is_cancelled() {
                info!(run_id = %state.run_id, turn = state.turn_count, "Cancellation observed");
                state.status = WorkflowStatus::Cancelled;
                break;
            }

            if state.turn_count >= state.max_turns() {
                info!(run_id = %state.run_id, turns = state.turn_count, "Turn budget exhausted");
                state.status = WorkflowStatus::Completed { truncated: true };
                break;
            }

            let actors = state.active_agents.clone();
            let mut report = if actors.len() <= 1 {
                match actors.first() {
                    Some(name) => self.single_turn(&state, name, &mut metrics).await,
                    None => TurnReport {
                        delta: Vec::new(),
                        fatal: Some("No active agent scheduled".to_string()),
                    },
                }
            } else {
                self.broadcast_round(&state, &actors, &mut metrics).await
            };

            // Tag completion signals before commit; committed messages are
            // immutable.
            for msg in &mut report.delta {
                if msg.role == Role::Agent && !msg.is_error() && msg.content.contains(&marker) {
                    msg.metadata.insert(FINAL_KEY.into(), serde_json::json!(true));
                }
            }
            let finished = report.delta.iter().any(Message::is_final);

            let next_active = self.next_active(&actors);
            state.commit_turn(report.delta, next_active);
            self.save_checkpoint(&state, &mut warnings).await;

            if let Some(reason) = report.fatal {
                error!(run_id = %state.run_id, reason = %reason, "Run failed");
                state.status = WorkflowStatus::Failed { reason };
                break;
            }

            if finished {
                info!(run_id = %state.run_id, turns = state.turn_count, "Completion signal observed");
                state.status = WorkflowStatus::Completed { truncated: false };
                break;
            }
        }

        let synthesized_result = state
            .last_agent_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(
            run_id = %state.run_id,
            status = ?state.status,
            turns = state.turn_count,
            messages = state.messages.len(),
            "Workflow run finished"
        );

        Ok(RunOutcome {
            run_id: state.run_id,
            status: state.status,
            messages: state.messages,
            synthesized_result,
            warnings,
            metrics,
        })
    }

    /// One agent's turn under the sequential pattern.
    async fn single_turn(
        &self,
        state: &WorkflowState,
        name: &str,
        metrics: &mut RunMetrics,
    ) -> TurnReport {
        let Some(node) = self.nodes.get(name) else {
            return TurnReport {
                delta: Vec::new(),
                fatal: Some(format!("Unknown agent scheduled: '{name}'")),
            };
        };

        let start = Instant::now();
        match self.agent_delta(node, &state.messages).await {
            Ok((delta, tool_calls)) => {
                metrics.record_turn(name, tool_calls, start.elapsed().as_millis() as u64);
                TurnReport { delta, fatal: None }
            }
            Err(e) => self.degraded_report(node, metrics, &e),
        }
    }

    /// One fan-out/fan-in round under the broadcast pattern. All recipients
    /// see the identical committed history and may run in parallel; the
    /// joined results are committed in agent-list order, not completion
    /// order, so runs stay reproducible.
    async fn broadcast_round(
        &self,
        state: &WorkflowState,
        actors: &[String],
        metrics: &mut RunMetrics,
    ) -> TurnReport {
        let steps = actors.iter().map(|name| {
            let node = self.nodes.get(name).cloned();
            async move {
                match node {
                    Some(node) => {
                        let start = Instant::now();
                        let result = self.agent_delta(&node, &state.messages).await;
                        (name, Some((node, result, start.elapsed())))
                    }
                    None => (name, None),
                }
            }
        });

        let mut delta = Vec::new();
        let mut fatal = None;
        for (name, step) in join_all(steps).await {
            match step {
                Some((node, Ok((messages, tool_calls)), elapsed)) => {
                    metrics.record_turn(node.name(), tool_calls, elapsed.as_millis() as u64);
                    delta.extend(messages);
                }
                Some((node, Err(e), _)) => {
                    let report = self.degraded_report(&node, metrics, &e);
                    delta.extend(report.delta);
                    if fatal.is_none() {
                        fatal = report.fatal;
                    }
                }
                None => {
                    if fatal.is_none() {
                        fatal = Some(format!("Unknown agent scheduled: '{name}'"));
                    }
                }
            }
        }

        TurnReport { delta, fatal }
    }

    /// Converts an exhausted model failure into a visible error message,
    /// escalating to a run failure only for critical agents.
    fn degraded_report(
        &self,
        node: &AgentNode,
        metrics: &mut RunMetrics,
        err: &TroupeError,
    ) -> TurnReport {
        error!(agent = %node.name(), error = %err, "Agent step failed");
        metrics.record_error(node.name());

        let msg = Message::agent(node.name(), format!("Model invocation failed: {err}"))
            .with_metadata(ERROR_KEY, serde_json::json!(true));

        let fatal = if node.is_critical() {
            Some(format!("Critical agent '{}' failed: {err}", node.name()))
        } else {
            warn!(agent = %node.name(), "Non-critical agent degraded, run continues");
            None
        };

        TurnReport {
            delta: vec![msg],
            fatal,
        }
    }

    /// Runs one agent step plus its within-turn tool loop. Returns the
    /// turn's message delta and the number of tool calls resolved. A tool
    /// failure becomes an error tool-result message; only a model failure
    /// that survived the retry policy surfaces as `Err`.
    async fn agent_delta(
        &self,
        node: &AgentNode,
        committed: &[Message],
    ) -> TroupeResult<(Vec<Message>, u32)> {
        let allowed = &node.config().tools;
        let descriptors = self.tools.descriptors_for(allowed);

        let mut transcript: Vec<Message> = committed.to_vec();
        let mut delta: Vec<Message> = Vec::new();
        let mut tool_calls_made = 0u32;
        let mut rounds = 0u32;

        loop {
            match node.step(&transcript, &descriptors).await? {
                StepReply::Message(msg) => {
                    delta.push(msg);
                    break;
                }
                StepReply::ToolRequests { message, calls } => {
                    if let Some(msg) = message {
                        transcript.push(msg.clone());
                        delta.push(msg);
                    }
                    for call in calls {
                        let result = self.tools.execute(call.clone(), allowed).await;
                        tool_calls_made += 1;
                        let msg = Message::tool_result(node.name(), &call, &result);
                        transcript.push(msg.clone());
                        delta.push(msg);
                    }
                    rounds += 1;
                    if rounds >= node.config().max_tool_rounds {
                        warn!(
                            agent = %node.name(),
                            rounds,
                            "Tool round budget exhausted, ending turn"
                        );
                        break;
                    }
                }
            }
        }

        Ok((delta, tool_calls_made))
    }

    /// Who acts after the given actor set.
    fn next_active(&self, current: &[String]) -> Vec<String> {
        match self.graph.pattern() {
            CommunicationPattern::Sequential => {
                let cur = current.first().map_or(self.graph.start(), String::as_str);
                let next = self
                    .graph
                    .successors(cur)
                    .first()
                    .cloned()
                    .unwrap_or_else(|| self.graph.start().to_string());
                vec![next]
            }
            CommunicationPattern::Broadcast => {
                let coordinator = self.graph.coordinator();
                let is_coordinator_turn = current.len() == 1 && current[0] == coordinator;
                if is_coordinator_turn {
                    let fan_out = self.graph.fan_out();
                    if fan_out.is_empty() {
                        vec![coordinator.to_string()]
                    } else {
                        fan_out
                    }
                } else {
                    vec![coordinator.to_string()]
                }
            }
        }
    }

    /// Snapshots the state after a committed turn. Persistence failures
    /// degrade resumability, not the live run: they are logged and surfaced
    /// as warnings on the outcome.
    async fn save_checkpoint(&self, state: &WorkflowState, warnings: &mut Vec<String>) {
        let snapshot = Checkpoint::capture(state);
        if let Err(e) = self.checkpoints.save(&snapshot).await {
            warn!(run_id = %state.run_id, turn = state.turn_count, error = %e, "Checkpoint save failed");
            warnings.push(format!(
                "Checkpoint at turn {} failed: {e}",
                state.turn_count
            ));
        }
    }
}

/// The run's effective completion marker.
fn completion_marker(state: &WorkflowState) -> String {
    state
        .metadata
        .get("completion_marker")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(DEFAULT_COMPLETION_MARKER)
        .to_string()
}

/// Convenience entry point matching the external run contract: build an
/// engine over the given configs (HTTP backends, empty tool registry,
/// in-memory checkpoints) and run it to completion.
pub async fn run_workflow(
    initial_message: &str,
    agent_configs: Vec<AgentConfig>,
    pattern: CommunicationPattern,
    metadata: HashMap<String, serde_json::Value>,
) -> TroupeResult<RunOutcome> {
    let engine = WorkflowEngine::from_configs(
        agent_configs,
        pattern,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryCheckpointStore::new()),
    )?;
    engine.run(initial_message, metadata).await
}
