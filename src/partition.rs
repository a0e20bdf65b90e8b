//! Static partitioning of an index range across workers.

use std::ops::Range;

/// Splits `0..len` into `workers` contiguous ranges.
///
/// The ranges are ordered, disjoint and cover `0..len` exactly. Each one
/// holds either `len / workers` or `len / workers + 1` items, and the first
/// `len % workers` ranges get the extra item. When there are more workers
/// than items the trailing ranges are empty.
///
/// A worker count of 0 or 1 yields the single range `0..len`.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    if workers <= 1 {
        return vec![0..len];
    }
    let base = len / workers;
    let rem = len % workers;
    let mut offset = 0;
    (0..workers)
        .map(|w| {
            let size = base + usize::from(w < rem);
            let range = offset..offset + size;
            offset += size;
            range
        })
        .collect()
}
