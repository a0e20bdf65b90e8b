//! Packs the final pairs into the sorted output.

use crate::buffer::StorageError;
use crate::{KeyValue, OutputRecord};

/// Sorts the final pairs by key and turns each one into an output record
/// holding a single value.
///
/// Nothing is merged. A key emitted twice by reduce shows up as two
/// adjacent records, in the order they sit in the buffer.
pub fn pack(pairs: &mut [KeyValue]) -> Result<Vec<OutputRecord>, StorageError> {
    pairs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut records = Vec::new();
    records.try_reserve_exact(pairs.len())?;
    records.extend(pairs.iter().map(|kv| OutputRecord {
        key: kv.key(),
        values: vec![kv.value()],
    }));
    Ok(records)
}
