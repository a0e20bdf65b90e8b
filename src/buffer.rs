//! Emission buffers and the per-worker [`Emitter`] handle.
//!
//! An [`EmissionBuffer`] is an append-only list of pairs behind a single
//! mutex. Capacity starts at a fixed size and doubles whenever it runs
//! out. A failed growth leaves the buffer exactly as it was.
//!
//! Callbacks never see the buffer directly. They get an [`Emitter`], which
//! either appends straight into the shared buffer under its lock
//! ([`EmitMode::Shared`]) or collects into a private list that is merged
//! after the worker has joined ([`EmitMode::WorkerLocal`]).

use std::collections::TryReserveError;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use crate::bounded::Limits;
use crate::standalone::config::{EmitMode, EngineConfig};
use crate::KeyValue;

/// Initial capacity of a buffer on its first allocation.
pub const INITIAL_CAPACITY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("emission buffer is full ({limit} entries)")]
    Exhausted { limit: usize },
    #[error("emission buffer capacity overflow")]
    CapacityOverflow,
    #[error("failed to grow emission buffer: {0}")]
    Alloc(#[from] TryReserveError),
}

/// Makes room for `additional` more entries, doubling the capacity as many
/// times as needed. On error `entries` is left untouched.
fn reserve(
    entries: &mut Vec<KeyValue>,
    additional: usize,
    initial_capacity: usize,
    max_entries: Option<usize>,
) -> Result<(), StorageError> {
    let needed = entries
        .len()
        .checked_add(additional)
        .ok_or(StorageError::CapacityOverflow)?;
    if let Some(limit) = max_entries {
        if needed > limit {
            return Err(StorageError::Exhausted { limit });
        }
    }
    if needed <= entries.capacity() {
        return Ok(());
    }

    let mut target = if entries.capacity() == 0 {
        initial_capacity.max(1)
    } else {
        entries.capacity()
    };
    while target < needed {
        target = target
            .checked_mul(2)
            .ok_or(StorageError::CapacityOverflow)?;
    }
    if let Some(limit) = max_entries {
        target = target.min(limit);
    }

    trace!(from = entries.capacity(), to = target, "growing emission buffer");
    entries.try_reserve_exact(target - entries.len())?;
    Ok(())
}

#[derive(Debug)]
pub struct EmissionBuffer {
    entries: Mutex<Vec<KeyValue>>,
    initial_capacity: usize,
    max_entries: Option<usize>,
}

impl Default for EmissionBuffer {
    fn default() -> Self {
        Self::new(INITIAL_CAPACITY, None)
    }
}

impl EmissionBuffer {
    /// Creates an empty buffer. Nothing is allocated until the first append.
    pub fn new(initial_capacity: usize, max_entries: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            initial_capacity,
            max_entries,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.initial_capacity, config.max_buffer_entries)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<KeyValue>> {
        // Entries are pushed whole, so a poisoned list is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends one pair. Safe to call from any number of workers at once.
    pub fn append(&self, kv: KeyValue) -> Result<(), StorageError> {
        let mut entries = self.lock();
        reserve(&mut entries, 1, self.initial_capacity, self.max_entries)?;
        entries.push(kv);
        Ok(())
    }

    /// Appends a whole batch, or nothing at all if the buffer cannot grow.
    pub fn extend(&self, batch: Vec<KeyValue>) -> Result<(), StorageError> {
        let mut entries = self.lock();
        reserve(
            &mut entries,
            batch.len(),
            self.initial_capacity,
            self.max_entries,
        )?;
        entries.extend(batch);
        Ok(())
    }

    /// Empties the buffer while keeping its storage.
    pub fn reset(&mut self) {
        self.entries_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Direct access for the single-threaded stages between joins.
    pub fn entries_mut(&mut self) -> &mut Vec<KeyValue> {
        self.entries.get_mut().unwrap_or_else(|e| e.into_inner())
    }
}

enum Sink<'a> {
    Shared(&'a EmissionBuffer),
    Local {
        entries: Vec<KeyValue>,
        initial_capacity: usize,
    },
}

/// The handle a map or reduce callback emits through.
///
/// One emitter belongs to one worker. The first storage failure it sees is
/// remembered, so the engine fails the run even if the callback ignored
/// the error returned from [`Emitter::emit`].
pub struct Emitter<'a> {
    sink: Sink<'a>,
    limits: Limits,
    emitted: usize,
    failure: Option<StorageError>,
}

impl<'a> Emitter<'a> {
    /// Creates the emitter of one worker writing, directly or after the
    /// join, into `buffer`.
    pub fn new(buffer: &'a EmissionBuffer, config: &EngineConfig) -> Self {
        let sink = match config.emit_mode {
            EmitMode::Shared => Sink::Shared(buffer),
            EmitMode::WorkerLocal => Sink::Local {
                entries: Vec::new(),
                initial_capacity: config.initial_capacity,
            },
        };
        Self {
            sink,
            limits: config.limits,
            emitted: 0,
            failure: None,
        }
    }

    /// Emits one pair. Overlong keys and values are truncated to the
    /// configured caps.
    pub fn emit(
        &mut self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<(), StorageError> {
        let kv = self.limits.bound(KeyValue::new(key, value));
        let appended = match &mut self.sink {
            Sink::Shared(buffer) => buffer.append(kv),
            Sink::Local {
                entries,
                initial_capacity,
            } => reserve(entries, 1, *initial_capacity, None).map(|()| entries.push(kv)),
        };
        match appended {
            Ok(()) => {
                self.emitted += 1;
                Ok(())
            }
            Err(err) => {
                if self.failure.is_none() {
                    self.failure = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    /// Number of pairs emitted successfully so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Fails if any emission through this handle has failed.
    pub fn check(&self) -> Result<(), StorageError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Consumes the emitter and hands back the pairs it still holds.
    ///
    /// Shared emitters have already written everything and return an empty
    /// list.
    pub fn finish(self) -> Result<Vec<KeyValue>, StorageError> {
        self.check()?;
        match self.sink {
            Sink::Shared(_) => Ok(Vec::new()),
            Sink::Local { entries, .. } => Ok(entries),
        }
    }
}
