//! Fork-join execution of one stage over a list of items.
//!
//! The items are split with [`partition`] and each non-empty slice runs on
//! its own scoped thread. Every worker owns one state value, built by
//! `init` and handed back after the join, which is how the stages collect
//! their emitters.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, trace, Span};

use crate::partition::partition;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Map,
    Reduce,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Map => f.write_str("map"),
            Stage::Reduce => f.write_str("reduce"),
        }
    }
}

/// Runs `callback` over every item and returns the worker states.
///
/// With `workers <= 1` everything runs on the calling thread in index
/// order and a single state is returned. Otherwise one thread is spawned
/// per non-empty slice, items within a slice run in order, and the call
/// blocks until all of them have finished. States come back in worker
/// order; empty slices spawn nothing and contribute no state.
///
/// A worker stops at its first failing item. The other workers run to
/// completion, and the first error in worker order becomes the result.
/// If a spawn fails, no further workers are started and the ones already
/// running are joined before the error is returned.
pub fn fan_out<T, S, I, F>(
    stage: Stage,
    items: &[T],
    workers: usize,
    init: I,
    callback: F,
) -> Result<Vec<S>>
where
    T: Sync,
    S: Send,
    I: Fn(usize) -> S + Sync,
    F: Fn(&T, &mut S) -> Result<()> + Sync,
{
    if workers <= 1 {
        trace!(%stage, items = items.len(), "running sequentially");
        let run = panic::catch_unwind(AssertUnwindSafe(|| -> Result<S> {
            let mut state = init(0);
            for (index, item) in items.iter().enumerate() {
                callback(item, &mut state)
                    .with_context(|| format!("{stage} failed on item {index}"))?;
            }
            Ok(state)
        }));
        return match run {
            Ok(state) => Ok(vec![state?]),
            Err(_) => Err(anyhow!("{stage} worker 0 panicked")),
        };
    }

    // Workers beyond the item count would only get empty slices.
    let ranges = partition(items.len(), workers.min(items.len().max(2)));
    let span = Span::current();
    let (init, callback) = (&init, &callback);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(ranges.len());
        let mut first_err = None;

        for (worker, range) in ranges.into_iter().enumerate() {
            if range.is_empty() {
                trace!(%stage, worker, "empty slice, not spawning");
                continue;
            }
            let start = range.start;
            let slice = &items[range];
            let span = span.clone();
            let spawned = thread::Builder::new()
                .name(format!("mr-{stage}-{worker}"))
                .spawn_scoped(scope, move || -> Result<S> {
                    let _enter = span.enter();
                    let mut state = init(worker);
                    for (offset, item) in slice.iter().enumerate() {
                        callback(item, &mut state).with_context(|| {
                            format!("{stage} worker {worker} failed on item {}", start + offset)
                        })?;
                    }
                    Ok(state)
                });
            match spawned {
                Ok(handle) => handles.push((worker, handle)),
                // Threads already running are still joined below before
                // the spawn error is returned.
                Err(err) => {
                    first_err = Some(
                        anyhow::Error::new(err)
                            .context(format!("failed to spawn {stage} worker {worker}")),
                    );
                    break;
                }
            }
        }
        debug!(%stage, spawned = handles.len(), "waiting for workers");

        let mut states = Vec::with_capacity(handles.len());
        for (worker, handle) in handles {
            match handle.join() {
                Ok(Ok(state)) => states.push(state),
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    first_err.get_or_insert_with(|| anyhow!("{stage} worker {worker} panicked"));
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(states),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn sequential_runs_in_index_order() {
        let items: Vec<usize> = (0..10).collect();
        let states = fan_out(Stage::Map, &items, 1, |_| Vec::new(), |item, seen: &mut Vec<usize>| {
            seen.push(*item);
            Ok(())
        })
        .unwrap();
        assert_eq!(states, vec![items]);
    }

    #[test]
    fn every_item_runs_once_across_workers() {
        let items: Vec<usize> = (0..103).collect();
        let states = fan_out(Stage::Map, &items, 7, |_| Vec::new(), |item, seen: &mut Vec<usize>| {
            seen.push(*item);
            Ok(())
        })
        .unwrap();
        assert_eq!(states.len(), 7);
        for seen in &states {
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "slice order kept");
        }
        let mut all: Vec<usize> = states.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, items);
    }

    #[test]
    fn empty_slices_spawn_nothing() {
        let items = vec!["a", "b"];
        let started = AtomicUsize::new(0);
        let states = fan_out(
            Stage::Reduce,
            &items,
            5,
            |worker| {
                started.fetch_add(1, Ordering::SeqCst);
                worker
            },
            |_, _| Ok(()),
        )
        .unwrap();
        assert_eq!(states, vec![0, 1]);
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_input_parallel_is_ok() {
        let items: Vec<u8> = Vec::new();
        let states = fan_out(Stage::Map, &items, 4, |_| (), |_, _| Ok(())).unwrap();
        assert!(states.is_empty());
    }

    #[test]
    fn first_error_is_reported_after_join() {
        let items: Vec<usize> = (0..20).collect();
        let finished = Mutex::new(Vec::new());
        let err = fan_out(
            Stage::Map,
            &items,
            4,
            |worker| worker,
            |item, worker: &mut usize| {
                if *item == 6 {
                    bail!("boom");
                }
                if *item % 5 == 4 {
                    finished.lock().unwrap().push(*worker);
                }
                Ok(())
            },
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("boom"));
        assert!(format!("{err:#}").contains("map worker 1"));
        // workers 0, 2 and 3 still ran their whole slice
        let mut finished = finished.into_inner().unwrap();
        finished.sort_unstable();
        assert_eq!(finished, vec![0, 2, 3]);
    }

    #[test]
    fn panicking_sequential_callback_fails_the_stage() {
        let items: Vec<usize> = (0..3).collect();
        let err = fan_out(Stage::Reduce, &items, 1, |_| (), |item, _| {
            if *item == 1 {
                panic!("callback blew up");
            }
            Ok(())
        })
        .unwrap_err();
        assert!(err.to_string().contains("reduce worker 0 panicked"));
    }

    #[test]
    fn huge_worker_count_is_clamped() {
        let items = vec!["a", "b"];
        let states = fan_out(Stage::Reduce, &items, usize::MAX, |worker| worker, |_, _| Ok(())).unwrap();
        assert_eq!(states, vec![0, 1]);
    }

    #[test]
    fn panicking_worker_fails_the_stage() {
        let items: Vec<usize> = (0..4).collect();
        let err = fan_out(Stage::Reduce, &items, 2, |_| (), |item, _| {
            if *item == 3 {
                panic!("worker blew up");
            }
            Ok(())
        })
        .unwrap_err();
        assert!(err.to_string().contains("reduce worker 1 panicked"));
    }
}
