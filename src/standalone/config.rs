//! Engine configuration.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::bounded::Limits;
use crate::buffer::INITIAL_CAPACITY;

/// Where a worker's emissions go while the stage is running.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmitMode {
    /// Every emission appends to the stage buffer under its lock.
    Shared,
    /// Each worker collects privately. The lists are merged into the stage
    /// buffer on the orchestrating thread after the join.
    #[default]
    WorkerLocal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: Limits,
    pub emit_mode: EmitMode,
    /// Capacity of a buffer's first allocation.
    pub initial_capacity: usize,
    /// Upper bound on the entries a single buffer may hold.
    pub max_buffer_entries: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            emit_mode: EmitMode::default(),
            initial_capacity: INITIAL_CAPACITY,
            max_buffer_entries: None,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        ensure!(self.initial_capacity > 0, "initial capacity must be at least 1");
        Ok(())
    }
}
