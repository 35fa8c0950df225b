//! Execution graph construction and validation.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use troupe_agent::{AgentConfig, AgentRole};
use troupe_core::{TroupeError, TroupeResult};

/// The topology governing which agent(s) act next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationPattern {
    /// Agents act one after another in list order, the last looping back
    /// to the designated coordinator.
    Sequential,
    /// The coordinator fans out to every other agent; all replies are
    /// collected before the next coordinator turn.
    Broadcast,
}

impl std::fmt::Display for CommunicationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommunicationPattern::Sequential => write!(f, "sequential"),
            CommunicationPattern::Broadcast => write!(f, "broadcast"),
        }
    }
}

impl FromStr for CommunicationPattern {
    type Err = TroupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(CommunicationPattern::Sequential),
            "broadcast" => Ok(CommunicationPattern::Broadcast),
            other => Err(TroupeError::Config(format!(
                "Unsupported communication pattern: '{other}'"
            ))),
        }
    }
}

/// A directed execution graph over agent names.
///
/// Construction is a pure function of the agent list and the pattern; the
/// graph is immutable once built. Both patterns are cyclic across rounds
/// (ring and star) — termination comes from the scheduler's turn budget
/// and completion-signal logic, never from graph shape.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    pattern: CommunicationPattern,
    order: Vec<String>,
    edges: HashMap<String, Vec<String>>,
    start: String,
    coordinator: String,
}

impl ExecutionGraph {
    /// Builds and validates a graph for the given agents and pattern.
    ///
    /// Fails with [`TroupeError::Config`] on an empty agent list or a
    /// duplicate agent name — before any agent is invoked.
    pub fn build(configs: &[AgentConfig], pattern: CommunicationPattern) -> TroupeResult<Self> {
        if configs.is_empty() {
            return Err(TroupeError::Config(
                "At least one agent is required".to_string(),
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for config in configs {
            if !seen.insert(config.name.as_str()) {
                return Err(TroupeError::Config(format!(
                    "Duplicate agent name: '{}'",
                    config.name
                )));
            }
        }

        let order: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();

        // The designated coordinator anchors both topologies: the first
        // Coordinator-role agent, else the first agent in list order.
        let coordinator = configs
            .iter()
            .find(|c| c.role == AgentRole::Coordinator)
            .map_or_else(|| order[0].clone(), |c| c.name.clone());

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let start;

        match pattern {
            CommunicationPattern::Sequential => {
                for pair in order.windows(2) {
                    edges.insert(pair[0].clone(), vec![pair[1].clone()]);
                }
                // Ring: the last agent hands control back to the coordinator.
                if let Some(last) = order.last() {
                    edges.insert(last.clone(), vec![coordinator.clone()]);
                }
                start = order[0].clone();
            }
            CommunicationPattern::Broadcast => {
                let fan_out: Vec<String> = order
                    .iter()
                    .filter(|name| **name != coordinator)
                    .cloned()
                    .collect();
                for name in &fan_out {
                    edges.insert(name.clone(), vec![coordinator.clone()]);
                }
                edges.insert(coordinator.clone(), fan_out);
                start = coordinator.clone();
            }
        }

        Ok(Self {
            pattern,
            order,
            edges,
            start,
            coordinator,
        })
    }

    /// The pattern this graph was built for.
    pub fn pattern(&self) -> CommunicationPattern {
        self.pattern
    }

    /// Agent names in configured list order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// The agent that acts first.
    pub fn start(&self) -> &str {
        &self.start
    }

    /// The designated coordinator.
    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }

    /// Outgoing edges of an agent (empty for unknown names).
    pub fn successors(&self, name: &str) -> &[String] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// The broadcast fan-out set: every non-coordinator agent, list order.
    pub fn fan_out(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| **name != self.coordinator)
            .cloned()
            .collect()
    }

    /// Whether an agent participates in this graph.
    pub fn contains(&self, name: &str) -> bool {
        self.order.iter().any(|n| n == name)
    }
}
