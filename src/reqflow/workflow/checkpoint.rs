// SPDX-License-Identifier: MIT

//! Checkpoints of paused runs
//!
//! A checkpoint is the durable projection of a paused run: a serialized state
//! snapshot, the step it is paused at and the resume values that step has
//! already consumed. The executor only ever asks the store to save, load or
//! delete; it never edits a checkpoint in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::step::Interrupt;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Checkpoint not found for run: {0}")]
    NotFound(String),
}

/// Saved state of a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// Serialized state snapshot
    pub state: Value,
    /// Step the run is suspended in
    pub paused_at: String,
    /// What the step asked for
    pub interrupt: Interrupt,
    /// Values already fed to earlier `interrupt` calls of the paused step
    pub resume_values: Vec<String>,
    pub step_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        run_id: impl Into<String>,
        state: Value,
        interrupt: Interrupt,
        resume_values: Vec<String>,
        step_count: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            state,
            paused_at: interrupt.step.clone(),
            interrupt,
            resume_values,
            step_count,
            created_at: Utc::now(),
        }
    }
}

/// Storage for checkpoints, keyed by run id
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create or overwrite the checkpoint of `checkpoint.run_id`
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
    /// Remove a checkpoint; deleting a missing one is not an error
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// In-memory store; checkpoints live as long as the process
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.data
            .write()
            .await
            .insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.data.read().await.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.data.write().await.remove(run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.data.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
