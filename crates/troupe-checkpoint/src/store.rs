//! Pluggable checkpoint storage.
//!
//! All stores key checkpoints by run, order them by turn number, and
//! support an optional `keep_last` retention bound that prunes the oldest
//! checkpoints of a run after each save. Stores isolate runs from each
//! other, so independent runs may write concurrently.

use crate::checkpoint::Checkpoint;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use troupe_core::{TroupeError, TroupeResult};
use uuid::Uuid;

/// Persistence interface consumed by the workflow engine.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persists a checkpoint, returning its id.
    async fn save(&self, checkpoint: &Checkpoint) -> TroupeResult<Uuid>;

    /// Loads a checkpoint by id.
    async fn load(&self, id: Uuid) -> TroupeResult<Option<Checkpoint>>;

    /// The checkpoint with the highest turn number for a run.
    async fn latest(&self, run_id: Uuid) -> TroupeResult<Option<Checkpoint>>;

    /// All checkpoints of a run, ascending by turn number.
    async fn list(&self, run_id: Uuid) -> TroupeResult<Vec<Checkpoint>>;

    /// Deletes a checkpoint by id. Deleting a missing id is not an error.
    async fn delete(&self, id: Uuid) -> TroupeResult<()>;
}

fn sort_run(checkpoints: &mut [Checkpoint]) {
    checkpoints.sort_by(|a, b| a.turn.cmp(&b.turn).then_with(|| a.created_at.cmp(&b.created_at)));
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// In-memory store. The default for tests and ephemeral runs.
pub struct MemoryCheckpointStore {
    runs: RwLock<HashMap<Uuid, Vec<Checkpoint>>>,
    keep_last: Option<usize>,
}

impl MemoryCheckpointStore {
    /// Creates an unbounded in-memory store.
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            keep_last: None,
        }
    }

    /// Retains only the `keep_last` newest checkpoints per run.
    pub fn with_retention(mut self, keep_last: usize) -> Self {
        self.keep_last = Some(keep_last);
        self
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> TroupeResult<Uuid> {
        let mut runs = self.runs.write().await;
        let entries = runs.entry(checkpoint.run_id).or_default();
        entries.push(checkpoint.clone());
        sort_run(entries);
        if let Some(keep) = self.keep_last {
            if entries.len() > keep {
                let excess = entries.len() - keep;
                entries.drain(..excess);
            }
        }
        debug!(checkpoint_id = %checkpoint.id, run_id = %checkpoint.run_id, turn = checkpoint.turn, "Checkpoint saved");
        Ok(checkpoint.id)
    }

    async fn load(&self, id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .flatten()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn latest(&self, run_id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).and_then(|entries| entries.last().cloned()))
    }

    async fn list(&self, run_id: Uuid) -> TroupeResult<Vec<Checkpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned().unwrap_or_default())
    }

    async fn delete(&self, id: Uuid) -> TroupeResult<()> {
        let mut runs = self.runs.write().await;
        for entries in runs.values_mut() {
            entries.retain(|c| c.id != id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCheckpointStore
// ---------------------------------------------------------------------------

/// File-based store: one pretty-printed JSON file per checkpoint.
pub struct FileCheckpointStore {
    dir: PathBuf,
    keep_last: Option<usize>,
}

impl FileCheckpointStore {
    /// Creates the store, creating the directory if needed.
    pub async fn new(dir: PathBuf) -> TroupeResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            keep_last: None,
        })
    }

    /// Retains only the `keep_last` newest checkpoints per run.
    pub fn with_retention(mut self, keep_last: usize) -> Self {
        self.keep_last = Some(keep_last);
        self
    }

    fn checkpoint_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_all(&self) -> TroupeResult<Vec<Checkpoint>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = tokio::fs::read_to_string(&path).await?;
            let checkpoint: Checkpoint = serde_json::from_str(&data).map_err(|e| {
                TroupeError::Checkpoint(format!("Failed to parse {}: {e}", path.display()))
            })?;
            checkpoints.push(checkpoint);
        }
        Ok(checkpoints)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> TroupeResult<Uuid> {
        let path = self.checkpoint_path(checkpoint.id);
        let json = serde_json::to_string_pretty(checkpoint)?;
        tokio::fs::write(&path, json).await?;
        debug!(checkpoint_id = %checkpoint.id, path = %path.display(), "Checkpoint saved");

        if let Some(keep) = self.keep_last {
            let mut run = self.list(checkpoint.run_id).await?;
            if run.len() > keep {
                let excess = run.len() - keep;
                for old in run.drain(..excess) {
                    self.delete(old.id).await?;
                }
            }
        }
        Ok(checkpoint.id)
    }

    async fn load(&self, id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        let path = self.checkpoint_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let checkpoint: Checkpoint = serde_json::from_str(&data)
            .map_err(|e| TroupeError::Checkpoint(format!("Failed to parse checkpoint: {e}")))?;
        Ok(Some(checkpoint))
    }

    async fn latest(&self, run_id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        Ok(self.list(run_id).await?.pop())
    }

    async fn list(&self, run_id: Uuid) -> TroupeResult<Vec<Checkpoint>> {
        let mut checkpoints: Vec<Checkpoint> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|c| c.run_id == run_id)
            .collect();
        sort_run(&mut checkpoints);
        Ok(checkpoints)
    }

    async fn delete(&self, id: Uuid) -> TroupeResult<()> {
        let path = self.checkpoint_path(id);
        if path.exists() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteCheckpointStore
// ---------------------------------------------------------------------------

/// SQLite-backed store. Pass `":memory:"` for an ephemeral database.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    keep_last: Option<usize>,
}

impl SqliteCheckpointStore {
    /// Opens (and initializes) the database at `path`.
    pub fn new(path: &str) -> TroupeResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| TroupeError::Checkpoint(format!("Failed to open {path}: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                 id TEXT PRIMARY KEY,
                 run_id TEXT NOT NULL,
                 turn INTEGER NOT NULL,
                 created_at TEXT NOT NULL,
                 payload TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_checkpoints_run ON checkpoints (run_id, turn);",
        )
        .map_err(|e| TroupeError::Checkpoint(format!("Failed to init schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            keep_last: None,
        })
    }

    /// Retains only the `keep_last` newest checkpoints per run.
    pub fn with_retention(mut self, keep_last: usize) -> Self {
        self.keep_last = Some(keep_last);
        self
    }

    fn row_to_checkpoint(payload: String) -> TroupeResult<Checkpoint> {
        serde_json::from_str(&payload)
            .map_err(|e| TroupeError::Checkpoint(format!("Failed to parse checkpoint: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> TroupeResult<Uuid> {
        let payload = serde_json::to_string(checkpoint)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO checkpoints (id, run_id, turn, created_at, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                checkpoint.id.to_string(),
                checkpoint.run_id.to_string(),
                checkpoint.turn,
                checkpoint.created_at.to_rfc3339(),
                payload,
            ],
        )
        .map_err(|e| TroupeError::Checkpoint(format!("Failed to save checkpoint: {e}")))?;

        if let Some(keep) = self.keep_last {
            conn.execute(
                "DELETE FROM checkpoints WHERE run_id = ?1 AND id NOT IN (
                     SELECT id FROM checkpoints WHERE run_id = ?1
                     ORDER BY turn DESC, created_at DESC LIMIT ?2
                 )",
                rusqlite::params![checkpoint.run_id.to_string(), keep as i64],
            )
            .map_err(|e| TroupeError::Checkpoint(format!("Failed to prune checkpoints: {e}")))?;
        }

        debug!(checkpoint_id = %checkpoint.id, turn = checkpoint.turn, "Checkpoint saved");
        Ok(checkpoint.id)
    }

    async fn load(&self, id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT payload FROM checkpoints WHERE id = ?1")
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
        let mut rows = stmt
            .query_map(rusqlite::params![id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;

        match rows.next() {
            Some(payload) => {
                let payload = payload.map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
                Ok(Some(Self::row_to_checkpoint(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn latest(&self, run_id: Uuid) -> TroupeResult<Option<Checkpoint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM checkpoints WHERE run_id = ?1
                 ORDER BY turn DESC, created_at DESC LIMIT 1",
            )
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
        let mut rows = stmt
            .query_map(rusqlite::params![run_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;

        match rows.next() {
            Some(payload) => {
                let payload = payload.map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
                Ok(Some(Self::row_to_checkpoint(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, run_id: Uuid) -> TroupeResult<Vec<Checkpoint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT payload FROM checkpoints WHERE run_id = ?1
                 ORDER BY turn ASC, created_at ASC",
            )
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![run_id.to_string()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;

        let mut checkpoints = Vec::new();
        for payload in rows {
            let payload = payload.map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
            checkpoints.push(Self::row_to_checkpoint(payload)?);
        }
        Ok(checkpoints)
    }

    async fn delete(&self, id: Uuid) -> TroupeResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM checkpoints WHERE id = ?1",
            rusqlite::params![id.to_string()],
        )
        .map_err(|e| TroupeError::Checkpoint(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
