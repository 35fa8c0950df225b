//! End-to-end workflow tests.
//!
//! Drives the engine with scripted mock model backends and verifies turn
//! ordering, broadcast determinism, turn budgets, completion signals,
//! degradation rules, tool recovery and checkpoint/resume equivalence.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use troupe_agent::{AgentConfig, AgentNode, AgentRole, ModelBackend, ModelConfig, ModelProvider, ModelReply};
use troupe_builtins::EchoTool;
use troupe_checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use troupe_core::{Message, Role, ToolCall, ToolResult, TroupeError, TroupeResult, WorkflowStatus};
use troupe_tools::{Tool, ToolDescriptor, ToolRegistry};
use troupe_workflow::{CancelHandle, CommunicationPattern, WorkflowEngine};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Mock model backends
// ---------------------------------------------------------------------------

/// Replies as a pure function of the history length, so a resumed run
/// reproduces an uninterrupted one exactly.
struct DeterministicBackend {
    name: String,
}

#[async_trait]
impl ModelBackend for DeterministicBackend {
    async fn invoke(
        &self,
        _system_message: Option<&str>,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        Ok(ModelReply::Text(format!(
            "{} reply at {}",
            self.name,
            history.len()
        )))
    }
}

/// Pops scripted replies in order; errors once the script is exhausted.
struct ScriptedBackend {
    script: Mutex<VecDeque<TroupeResult<ModelReply>>>,
}

impl ScriptedBackend {
    fn new(script: Vec<TroupeResult<ModelReply>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(
        &self,
        _system_message: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(TroupeError::Model("script exhausted".into())))
    }
}

/// Sleeps before replying and records the history length it observed.
struct DelayedBackend {
    name: String,
    delay_ms: u64,
    observed: Arc<Mutex<Vec<(String, usize)>>>,
}

#[async_trait]
impl ModelBackend for DelayedBackend {
    async fn invoke(
        &self,
        _system_message: Option<&str>,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        self.observed
            .lock()
            .await
            .push((self.name.clone(), history.len()));
        Ok(ModelReply::Text(format!("{} done", self.name)))
    }
}

/// Always fails with a non-retryable error.
struct BrokenBackend;

#[async_trait]
impl ModelBackend for BrokenBackend {
    async fn invoke(
        &self,
        _system_message: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        Err(TroupeError::Http("400 Bad Request".into()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn model() -> ModelConfig {
    ModelConfig {
        provider: ModelProvider::OpenAi,
        model_id: "test-model".into(),
        api_key: "test-key".into(),
        api_base_url: None,
        temperature: 0.0,
        max_tokens: 64,
        retry_policy: None,
    }
}

fn node(name: &str, role: AgentRole, backend: Arc<dyn ModelBackend>) -> AgentNode {
    AgentNode::new(AgentConfig::new(name, role, "test instructions", model()), backend)
}

fn deterministic(name: &str, role: AgentRole) -> AgentNode {
    node(
        name,
        role,
        Arc::new(DeterministicBackend { name: name.into() }),
    )
}

fn engine(nodes: Vec<AgentNode>, pattern: CommunicationPattern) -> WorkflowEngine {
    engine_with_store(nodes, pattern, Arc::new(MemoryCheckpointStore::new()))
}

fn engine_with_store(
    nodes: Vec<AgentNode>,
    pattern: CommunicationPattern,
    store: Arc<dyn CheckpointStore>,
) -> WorkflowEngine {
    WorkflowEngine::new(nodes, pattern, Arc::new(ToolRegistry::new()), store)
        .expect("engine should build")
}

fn meta(max_turns: u32) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert("max_turns".to_string(), serde_json::json!(max_turns));
    metadata
}

fn senders(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.sender.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Scenarios from the run contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_agent_single_turn() {
    let engine = engine(
        vec![deterministic("summarizer", AgentRole::Executor)],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("Summarize X", meta(1)).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[0].role, Role::User);
    assert_eq!(outcome.messages[1].role, Role::Agent);
    assert_eq!(outcome.synthesized_result, outcome.messages[1].content);
    assert_eq!(outcome.metrics.per_agent["summarizer"].turns, 1);
}

#[tokio::test]
async fn sequential_round_robin_order() {
    let engine = engine(
        vec![
            deterministic("coordinator", AgentRole::Coordinator),
            deterministic("reviewer", AgentRole::Reviewer),
        ],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("kick off", meta(4)).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });
    assert_eq!(
        senders(&outcome.messages),
        vec!["user", "coordinator", "reviewer", "coordinator", "reviewer"]
    );
    // One turn_count increment per agent invocation.
    assert_eq!(outcome.metrics.per_agent["coordinator"].turns, 2);
    assert_eq!(outcome.metrics.per_agent["reviewer"].turns, 2);
}

#[tokio::test]
async fn turn_budget_is_a_hard_bound() {
    let engine = engine(
        vec![deterministic("solo", AgentRole::Executor)],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(3)).await.unwrap();

    let agent_turns = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Agent)
        .count();
    assert_eq!(agent_turns, 3);
    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });
}

#[tokio::test]
async fn sequence_numbers_are_monotonic() {
    let engine = engine(
        vec![
            deterministic("a", AgentRole::Executor),
            deterministic("b", AgentRole::Executor),
        ],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(4)).await.unwrap();
    let seqs: Vec<u64> = outcome.messages.iter().map(|m| m.created_at).collect();
    assert_eq!(seqs, (0..outcome.messages.len() as u64).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Broadcast determinism
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broadcast_commits_in_list_order_and_shares_history() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let engine = engine(
        vec![
            deterministic("lead", AgentRole::Coordinator),
            node(
                "slow",
                AgentRole::Specialist,
                Arc::new(DelayedBackend {
                    name: "slow".into(),
                    delay_ms: 80,
                    observed: observed.clone(),
                }),
            ),
            node(
                "fast",
                AgentRole::Specialist,
                Arc::new(DelayedBackend {
                    name: "fast".into(),
                    delay_ms: 5,
                    observed: observed.clone(),
                }),
            ),
        ],
        CommunicationPattern::Broadcast,
    );

    // Turn 1: lead. Turn 2: fan-out round over [slow, fast].
    let outcome = engine.run("fan out", meta(2)).await.unwrap();

    // Committed order follows the agent list even though "fast" finished
    // first.
    assert_eq!(
        senders(&outcome.messages),
        vec!["user", "lead", "slow", "fast"]
    );

    // Both recipients saw the identical preceding history (user + lead).
    let observations = observed.lock().await.clone();
    assert_eq!(observations.len(), 2);
    assert!(observations.iter().all(|(_, len)| *len == 2));
}

#[tokio::test]
async fn broadcast_alternates_coordinator_and_fanout() {
    let engine = engine(
        vec![
            deterministic("lead", AgentRole::Coordinator),
            deterministic("a", AgentRole::Specialist),
            deterministic("b", AgentRole::Specialist),
        ],
        CommunicationPattern::Broadcast,
    );

    let outcome = engine.run("go", meta(3)).await.unwrap();

    // lead, round(a+b), lead — a fan-out round advances the turn count by
    // exactly one.
    assert_eq!(
        senders(&outcome.messages),
        vec!["user", "lead", "a", "b", "lead"]
    );
}

// ---------------------------------------------------------------------------
// Completion signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_marker_ends_the_run() {
    let coordinator = node(
        "lead",
        AgentRole::Coordinator,
        Arc::new(ScriptedBackend::new(vec![
            Ok(ModelReply::Text("delegating work".into())),
            Ok(ModelReply::Text("all wrapped up, WORKFLOW_COMPLETE".into())),
        ])),
    );
    let engine = engine(
        vec![coordinator, deterministic("worker", AgentRole::Executor)],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(10)).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: false });
    let last = outcome.messages.last().unwrap();
    assert!(last.is_final());
    assert!(last.content.contains("WORKFLOW_COMPLETE"));
    // lead, worker, lead — stopped well before the budget.
    assert_eq!(outcome.messages.len(), 4);
}

#[tokio::test]
async fn custom_completion_marker_from_metadata() {
    let solo = node(
        "solo",
        AgentRole::Executor,
        Arc::new(ScriptedBackend::new(vec![Ok(ModelReply::Text(
            "answer ready [DONE]".into(),
        ))])),
    );
    let engine = engine(vec![solo], CommunicationPattern::Sequential);

    let mut metadata = meta(5);
    metadata.insert("completion_marker".to_string(), serde_json::json!("[DONE]"));

    let outcome = engine.run("go", metadata).await.unwrap();
    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: false });
    assert_eq!(outcome.messages.len(), 2);
}

// ---------------------------------------------------------------------------
// Tool resolution
// ---------------------------------------------------------------------------

/// A tool that always faults.
struct BoomTool {
    descriptor: ToolDescriptor,
}

impl BoomTool {
    fn new() -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: "boom".into(),
                description: "Always fails".into(),
                parameters_schema: serde_json::json!({"type": "object"}),
            },
        }
    }
}

#[async_trait]
impl Tool for BoomTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _call: ToolCall) -> TroupeResult<ToolResult> {
        Err(TroupeError::Tool("exploded".into()))
    }
}

#[tokio::test]
async fn tool_failure_degrades_into_the_conversation() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::new()));
    registry.register(Arc::new(BoomTool::new()));

    let config = AgentConfig::new("worker", AgentRole::Executor, "use tools", model())
        .with_tools(vec!["echo".into(), "boom".into()]);
    let worker = AgentNode::new(
        config,
        Arc::new(ScriptedBackend::new(vec![
            Ok(ModelReply::ToolUse {
                content: Some("trying the tools".into()),
                tool_calls: vec![
                    ToolCall {
                        id: "tc-1".into(),
                        name: "echo".into(),
                        arguments: serde_json::json!({"text": "ping"}),
                    },
                    ToolCall {
                        id: "tc-2".into(),
                        name: "boom".into(),
                        arguments: serde_json::json!({}),
                    },
                ],
            }),
            Ok(ModelReply::Text("recovered".into())),
        ])),
    );

    let engine = WorkflowEngine::new(
        vec![worker],
        CommunicationPattern::Sequential,
        Arc::new(registry),
        Arc::new(MemoryCheckpointStore::new()),
    )
    .unwrap();

    let outcome = engine.run("go", meta(1)).await.unwrap();

    // The run completed; the tool failure never escalated.
    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });

    let tool_messages: Vec<&Message> = outcome
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].content, "ping");
    assert!(!tool_messages[0].is_error());
    assert!(tool_messages[1].is_error());
    assert!(tool_messages[1].content.contains("exploded"));

    assert_eq!(outcome.synthesized_result, "recovered");
    assert_eq!(outcome.metrics.per_agent["worker"].tool_calls, 2);
}

// ---------------------------------------------------------------------------
// Degradation and failure escalation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn noncritical_failure_degrades_and_continues() {
    let engine = engine(
        vec![
            deterministic("lead", AgentRole::Coordinator),
            node("flaky", AgentRole::Executor, Arc::new(BrokenBackend)),
        ],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(3)).await.unwrap();

    // lead, flaky (error), lead — still truncated-complete, not failed.
    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });
    let error_messages: Vec<&Message> =
        outcome.messages.iter().filter(|m| m.is_error()).collect();
    assert_eq!(error_messages.len(), 1);
    assert_eq!(error_messages[0].sender, "flaky");
    assert_eq!(outcome.metrics.per_agent["flaky"].errors, 1);
}

#[tokio::test]
async fn critical_failure_fails_the_run() {
    let engine = engine(
        vec![
            node("lead", AgentRole::Coordinator, Arc::new(BrokenBackend)),
            deterministic("worker", AgentRole::Executor),
        ],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(5)).await.unwrap();

    match &outcome.status {
        WorkflowStatus::Failed { reason } => assert!(reason.contains("lead")),
        other => panic!("Expected Failed, got {other:?}"),
    }
    // The error is visible in the history even for a failed run.
    assert!(outcome.messages.iter().any(|m| m.is_error()));
}

#[tokio::test]
async fn criticality_override_escalates_worker_failure() {
    let config = AgentConfig::new("worker", AgentRole::Executor, "work", model())
        .with_critical(true);
    let engine = engine(
        vec![
            deterministic("lead", AgentRole::Coordinator),
            AgentNode::new(config, Arc::new(BrokenBackend)),
        ],
        CommunicationPattern::Sequential,
    );

    let outcome = engine.run("go", meta(4)).await.unwrap();
    assert!(matches!(outcome.status, WorkflowStatus::Failed { .. }));
}

// ---------------------------------------------------------------------------
// Build-time validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_agent_names_rejected_before_any_invocation() {
    let result = WorkflowEngine::new(
        vec![
            deterministic("dup", AgentRole::Coordinator),
            deterministic("dup", AgentRole::Reviewer),
        ],
        CommunicationPattern::Sequential,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryCheckpointStore::new()),
    );

    match result {
        Err(TroupeError::Config(msg)) => assert!(msg.contains("Duplicate")),
        other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn empty_agent_list_rejected() {
    let result = WorkflowEngine::new(
        Vec::new(),
        CommunicationPattern::Broadcast,
        Arc::new(ToolRegistry::new()),
        Arc::new(MemoryCheckpointStore::new()),
    );
    assert!(matches!(result, Err(TroupeError::Config(_))));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_observed_at_turn_boundary() {
    let engine = engine(
        vec![deterministic("solo", AgentRole::Executor)],
        CommunicationPattern::Sequential,
    );

    let cancel = CancelHandle::new();
    cancel.cancel();

    let outcome = engine
        .run_cancellable("go", meta(10), cancel)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Cancelled);
    // No agent ever ran; only the seeded user message exists.
    assert_eq!(outcome.messages.len(), 1);
}

// ---------------------------------------------------------------------------
// Checkpointing and resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_from_mid_run_checkpoint_matches_uninterrupted_run() {
    let store: Arc<MemoryCheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let engine = engine_with_store(
        vec![
            deterministic("coordinator", AgentRole::Coordinator),
            deterministic("reviewer", AgentRole::Reviewer),
        ],
        CommunicationPattern::Sequential,
        store.clone(),
    );

    let full = engine.run("kick off", meta(4)).await.unwrap();
    assert_eq!(full.messages.len(), 5);

    // Resume from the snapshot taken after turn 2 and let it finish.
    let checkpoints = store.list(full.run_id).await.unwrap();
    let at_two = checkpoints
        .iter()
        .find(|c| c.turn == 2)
        .expect("turn-2 checkpoint");
    let resumed = engine.resume(at_two.id).await.unwrap();

    assert_eq!(resumed.run_id, full.run_id);
    assert_eq!(resumed.status, full.status);
    assert_eq!(resumed.messages.len(), full.messages.len());
    for (a, b) in full.messages.iter().zip(resumed.messages.iter()) {
        assert_eq!(a.sender, b.sender);
        assert_eq!(a.content, b.content);
        assert_eq!(a.created_at, b.created_at);
    }
}

#[tokio::test]
async fn checkpoints_are_taken_at_every_turn_boundary() {
    let store: Arc<MemoryCheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let engine = engine_with_store(
        vec![deterministic("solo", AgentRole::Executor)],
        CommunicationPattern::Sequential,
        store.clone(),
    );

    let outcome = engine.run("go", meta(3)).await.unwrap();
    let turns: Vec<u32> = store
        .list(outcome.run_id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.turn)
        .collect();
    assert_eq!(turns, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn resume_of_unknown_checkpoint_is_an_error() {
    let engine = engine(
        vec![deterministic("solo", AgentRole::Executor)],
        CommunicationPattern::Sequential,
    );
    let err = engine.resume(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, TroupeError::Checkpoint(_)));
}

/// A store whose saves always fail.
struct FailingStore;

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn save(&self, _checkpoint: &Checkpoint) -> TroupeResult<Uuid> {
        Err(TroupeError::Checkpoint("disk full".into()))
    }

    async fn load(&self, _id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        Ok(None)
    }

    async fn latest(&self, _run_id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        Ok(None)
    }

    async fn list(&self, _run_id: Uuid) -> TroupeResult<Vec<Checkpoint>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _id: Uuid) -> TroupeResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn checkpoint_failure_warns_but_does_not_fail_the_run() {
    let engine = engine_with_store(
        vec![deterministic("solo", AgentRole::Executor)],
        CommunicationPattern::Sequential,
        Arc::new(FailingStore),
    );

    let outcome = engine.run("go", meta(2)).await.unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed { truncated: true });
    assert!(!outcome.warnings.is_empty());
    assert!(outcome.warnings[0].contains("disk full"));
}
