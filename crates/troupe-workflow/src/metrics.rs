//! Per-agent execution metrics for one run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Counters tracked per agent over a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTotals {
    /// Committed turns this agent participated in.
    pub turns: u32,
    /// Tool invocations resolved on this agent's behalf.
    pub tool_calls: u32,
    /// Model failures recorded for this agent.
    pub errors: u32,
    /// Wall-clock time spent in this agent's steps.
    pub duration_ms: u64,
}

/// Metrics for one run, keyed by agent name.
///
/// The scheduler is the only writer, so this is a plain value aggregated
/// synchronously at turn boundaries and returned with the run outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Per-agent counters.
    pub per_agent: HashMap<String, AgentTotals>,
}

impl RunMetrics {
    /// Records a completed turn for an agent.
    pub fn record_turn(&mut self, agent: &str, tool_calls: u32, duration_ms: u64) {
        let totals = self.per_agent.entry(agent.to_string()).or_default();
        totals.turns += 1;
        totals.tool_calls += tool_calls;
        totals.duration_ms += duration_ms;
    }

    /// Records a model failure for an agent.
    pub fn record_error(&mut self, agent: &str) {
        self.per_agent.entry(agent.to_string()).or_default().errors += 1;
    }

    /// Aggregate counters across all agents.
    pub fn totals(&self) -> AgentTotals {
        let mut total = AgentTotals::default();
        for totals in self.per_agent.values() {
            total.turns += totals.turns;
            total.tool_calls += totals.tool_calls;
            total.errors += totals.errors;
            total.duration_ms += totals.duration_ms;
        }
        total
    }
}
