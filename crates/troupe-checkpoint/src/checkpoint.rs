//! Point-in-time snapshots of workflow state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use troupe_core::WorkflowState;
use uuid::Uuid;

/// An immutable snapshot of a run's state at a turn boundary.
///
/// The captured state is a structural deep copy: `WorkflowState` owns all
/// of its substructure, so cloning it shares nothing mutable with the live
/// object, and later mutation of the running state cannot retroactively
/// alter a persisted checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier for this checkpoint.
    pub id: Uuid,
    /// The run this checkpoint belongs to.
    pub run_id: Uuid,
    /// Turn number at capture time. Checkpoints are totally ordered per
    /// run by this field.
    pub turn: u32,
    /// UTC timestamp of capture.
    pub created_at: DateTime<Utc>,
    /// The snapshotted state.
    pub state: WorkflowState,
}

impl Checkpoint {
    /// Captures a deep snapshot of the given state.
    pub fn capture(state: &WorkflowState) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: state.run_id,
            turn: state.turn_count,
            created_at: Utc::now(),
            state: state.clone(),
        }
    }
}
