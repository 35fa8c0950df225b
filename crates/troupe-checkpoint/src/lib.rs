//! Checkpoint capture and persistence for the Troupe workflow engine.
//!
//! A [`Checkpoint`] is an immutable deep snapshot of a
//! [`WorkflowState`](troupe_core::WorkflowState) at a turn boundary.
//! Storage is pluggable behind the [`CheckpointStore`] trait; this crate
//! ships an in-memory store, a JSON-file store, and a SQLite store.

/// The checkpoint snapshot type.
pub mod checkpoint;
/// Pluggable checkpoint storage.
pub mod store;

pub use checkpoint::Checkpoint;
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
