//! The group-by-key (shuffle) stage.

use itertools::Itertools;

use crate::buffer::StorageError;
use crate::{Group, KeyValue};

/// Sorts `pairs` by key and merges runs of equal keys into groups.
///
/// Keys compare byte-wise, so the groups come out in ascending
/// lexicographic order. The sort is not stable, and the value order
/// inside a group must not be relied on.
pub fn group_by_key(pairs: &mut [KeyValue]) -> Result<Vec<Group>, StorageError> {
    pairs.sort_unstable_by(|a, b| a.key.cmp(&b.key));

    let distinct = pairs.iter().dedup_by(|a, b| a.key == b.key).count();
    let mut groups = Vec::new();
    groups.try_reserve_exact(distinct)?;

    for (key, run) in &pairs.iter().chunk_by(|kv| kv.key()) {
        groups.push(Group {
            key,
            values: run.map(KeyValue::value).collect(),
        });
    }
    Ok(groups)
}
