//! Core types for the Troupe workflow engine.
//!
//! This crate provides the message and state model shared across all Troupe
//! crates, plus the unified error type.
//!
//! # Main types
//!
//! - [`TroupeError`] — Unified error enum for all Troupe subsystems.
//! - [`TroupeResult`] — Convenience alias for `Result<T, TroupeError>`.
//! - [`Role`] — Message role (user, agent, system, tool).
//! - [`Message`] — A single immutable message within a workflow run.
//! - [`ToolCall`] / [`ToolResult`] — Tool invocation request and outcome.
//! - [`WorkflowState`] — The mutable per-run aggregate owned by the engine.
//! - [`WorkflowStatus`] — Run lifecycle state machine.

/// Error types.
pub mod error;
/// Message and tool-call types.
pub mod message;
/// Workflow state aggregate.
pub mod state;

pub use error::{TroupeError, TroupeResult};
pub use message::{Message, Role, ToolCall, ToolResult, ERROR_KEY, FINAL_KEY};
pub use state::{WorkflowState, WorkflowStatus, DEFAULT_MAX_TURNS};
