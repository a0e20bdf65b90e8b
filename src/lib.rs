//! A single-process, in-memory MapReduce (lite) engine.
//!
//! Users supply a map function and a reduce function along with a worker
//! count for each stage. The map stage fans out over the input records,
//! intermediate pairs are grouped by key, the reduce stage fans out over
//! the groups, and the final pairs come back sorted by key.

use bytes::Bytes;

pub mod bounded;
pub mod buffer;
pub mod executor;
pub mod group;
pub mod pack;
pub mod partition;
pub mod standalone;
pub mod utils;
pub mod workload;

pub use bounded::Limits;
pub use buffer::{EmissionBuffer, Emitter, StorageError};
pub use standalone::config::{EmitMode, EngineConfig};
pub use standalone::engine::{execute, MapReduce};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function takes an input record, an auxiliary argument and the
/// emitter of the worker it runs on.
///
/// It may emit any number of intermediate pairs.
pub type MapFn = fn(kv: &KeyValue, aux: &Bytes, emit: &mut Emitter<'_>) -> anyhow::Result<()>;

/// A reduce function takes one group of values sharing a key, an auxiliary
/// argument and the emitter of the worker it runs on.
///
/// It may emit any number of final pairs. The engine does not merge
/// duplicate keys, so emitting the same key twice yields two output records.
pub type ReduceFn =
    fn(group: &Group, aux: &Bytes, emit: &mut Emitter<'_>) -> anyhow::Result<()>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Get the value of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }
}

/// All values of the intermediate pairs that share one key.
///
/// Value order follows the sort that produced the group and does not
/// necessarily mirror input order.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Group {
    pub key: Bytes,
    pub values: Vec<Bytes>,
}

/// One record of the final output.
///
/// Every record produced by the engine carries exactly one value.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct OutputRecord {
    pub key: Bytes,
    pub values: Vec<Bytes>,
}
