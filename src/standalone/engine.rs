use anyhow::{Context, Result};
use tracing::{debug, info, info_span, trace};
use uuid::Uuid;

use crate::buffer::{EmissionBuffer, Emitter};
use crate::executor::{fan_out, Stage};
use crate::group::group_by_key;
use crate::pack::pack;
use crate::standalone::config::EngineConfig;
use crate::{Group, KeyValue, OutputRecord};

/// Runs one job with the default [`EngineConfig`].
///
/// Each call gets its own buffers, so concurrent calls do not interfere.
pub fn execute<M, R>(
    input: &[KeyValue],
    map: M,
    map_workers: usize,
    reduce: R,
    reduce_workers: usize,
) -> Result<Vec<OutputRecord>>
where
    M: Fn(&KeyValue, &mut Emitter<'_>) -> Result<()> + Sync,
    R: Fn(&Group, &mut Emitter<'_>) -> Result<()> + Sync,
{
    MapReduce::new(EngineConfig::default())?.run(input, map, map_workers, reduce, reduce_workers)
}

/// An engine instance owning the intermediate and final buffers.
///
/// Buffers keep their storage between runs. A run borrows the engine
/// mutably, so runs on one instance never overlap. Use one instance per
/// thread to run jobs concurrently.
pub struct MapReduce {
    config: EngineConfig,
    intermediate: EmissionBuffer,
    output: EmissionBuffer,
}

impl MapReduce {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            intermediate: EmissionBuffer::from_config(&config),
            output: EmissionBuffer::from_config(&config),
            config,
        })
    }

    /// Runs map, group-by-key, reduce and pack over `input`.
    ///
    /// Map and reduce each fan out over their own number of workers. The
    /// first failure of any worker fails the whole run after the stage has
    /// joined; pairs already emitted are simply discarded with the run.
    pub fn run<M, R>(
        &mut self,
        input: &[KeyValue],
        map: M,
        map_workers: usize,
        reduce: R,
        reduce_workers: usize,
    ) -> Result<Vec<OutputRecord>>
    where
        M: Fn(&KeyValue, &mut Emitter<'_>) -> Result<()> + Sync,
        R: Fn(&Group, &mut Emitter<'_>) -> Result<()> + Sync,
    {
        let span = info_span!("mapreduce", run_id = %Uuid::new_v4());
        let _enter = span.enter();

        let Self {
            config,
            intermediate,
            output,
        } = self;
        let config: &EngineConfig = config;
        intermediate.reset();
        output.reset();
        info!(records = input.len(), map_workers, reduce_workers, "starting run");

        let limits = config.limits;
        let emitters = fan_out(
            Stage::Map,
            input,
            map_workers,
            |_| Emitter::new(&*intermediate, config),
            |kv, emitter| {
                map(&limits.bound(kv.clone()), emitter)?;
                Ok(emitter.check()?)
            },
        )?;
        let pairs = drain_emitters(intermediate, emitters).context("map stage")?;
        debug!(pairs, "map stage done");

        if pairs == 0 {
            info!("map stage emitted nothing, skipping reduce");
            return Ok(Vec::new());
        }

        let groups = group_by_key(intermediate.entries_mut()).context("group stage")?;
        debug!(groups = groups.len(), "grouped intermediate pairs");

        let emitters = fan_out(
            Stage::Reduce,
            &groups,
            reduce_workers,
            |_| Emitter::new(&*output, config),
            |group, emitter| {
                reduce(group, emitter)?;
                Ok(emitter.check()?)
            },
        )?;
        let pairs = drain_emitters(output, emitters).context("reduce stage")?;
        debug!(pairs, "reduce stage done");

        let records = pack(output.entries_mut()).context("pack stage")?;
        info!(records = records.len(), "run complete");
        Ok(records)
    }
}

/// Moves whatever the emitters still hold into `buffer`, in worker order,
/// and returns the buffer's length.
fn drain_emitters(buffer: &EmissionBuffer, emitters: Vec<Emitter<'_>>) -> Result<usize> {
    for (worker, emitter) in emitters.into_iter().enumerate() {
        trace!(worker, emitted = emitter.emitted(), "collecting worker output");
        let held = emitter.finish()?;
        if !held.is_empty() {
            buffer.extend(held)?;
        }
    }
    Ok(buffer.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standalone::config::EmitMode;
    use crate::Limits;
    use anyhow::bail;
    use bytes::{Bytes, BytesMut};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity(kv: &KeyValue, emit: &mut Emitter<'_>) -> Result<()> {
        emit.emit(kv.key(), kv.value())?;
        Ok(())
    }

    fn concat(group: &Group, emit: &mut Emitter<'_>) -> Result<()> {
        let mut sorted = group.values.clone();
        sorted.sort();
        let mut joined = BytesMut::new();
        for value in sorted {
            joined.extend_from_slice(&value);
        }
        emit.emit(group.key.clone(), joined.freeze())?;
        Ok(())
    }

    fn sample() -> Vec<KeyValue> {
        vec![
            KeyValue::new("a", "1"),
            KeyValue::new("b", "2"),
            KeyValue::new("a", "3"),
        ]
    }

    fn pairs(records: &[OutputRecord]) -> Vec<(Bytes, Vec<Bytes>)> {
        records
            .iter()
            .map(|r| (r.key.clone(), r.values.clone()))
            .collect()
    }

    #[test]
    fn concatenates_values_per_key() {
        for mode in [EmitMode::Shared, EmitMode::WorkerLocal] {
            let config = EngineConfig {
                emit_mode: mode,
                ..EngineConfig::default()
            };
            let mut engine = MapReduce::new(config).unwrap();
            for (mappers, reducers) in [(1, 1), (2, 2), (3, 8)] {
                let out = engine
                    .run(&sample(), identity, mappers, concat, reducers)
                    .unwrap();
                assert_eq!(
                    pairs(&out),
                    vec![
                        (Bytes::from("a"), vec![Bytes::from("13")]),
                        (Bytes::from("b"), vec![Bytes::from("2")]),
                    ],
                    "{mode:?} {mappers}/{reducers}"
                );
            }
        }
    }

    #[test]
    fn empty_input_never_reduces() {
        let calls = AtomicUsize::new(0);
        let out = execute(
            &[],
            identity,
            4,
            |_: &Group, _: &mut Emitter<'_>| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            4,
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn map_that_emits_nothing_gives_empty_output() {
        let out = execute(&sample(), |_, _| Ok(()), 2, concat, 2).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn buffers_are_reset_between_runs() {
        let mut engine = MapReduce::new(EngineConfig::default()).unwrap();
        let first = engine.run(&sample(), identity, 2, concat, 2).unwrap();
        let second = engine.run(&sample(), identity, 2, concat, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn input_is_bounded_before_map() {
        let config = EngineConfig {
            limits: Limits::new(8, 16).unwrap(),
            ..EngineConfig::default()
        };
        let mut engine = MapReduce::new(config).unwrap();
        let input = [KeyValue::new("averylongkey", "v")];
        let out = engine
            .run(
                &input,
                |kv, _| {
                    assert_eq!(kv.key, "averylo");
                    Ok(())
                },
                1,
                concat,
                1,
            )
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn swallowed_emit_failure_still_fails_run() {
        let config = EngineConfig {
            emit_mode: EmitMode::Shared,
            max_buffer_entries: Some(2),
            ..EngineConfig::default()
        };
        let mut engine = MapReduce::new(config).unwrap();
        let result = engine.run(
            &sample(),
            |kv, emit| {
                let _ = emit.emit(kv.key(), kv.value());
                Ok(())
            },
            1,
            concat,
            1,
        );
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("full"), "{err:#}");
    }

    #[test]
    fn merge_over_ceiling_fails_run() {
        let config = EngineConfig {
            emit_mode: EmitMode::WorkerLocal,
            max_buffer_entries: Some(2),
            ..EngineConfig::default()
        };
        let mut engine = MapReduce::new(config).unwrap();
        assert!(engine.run(&sample(), identity, 3, concat, 1).is_err());
    }

    #[test]
    fn reduce_error_fails_run() {
        let err = execute(
            &sample(),
            identity,
            2,
            |group, _| {
                if group.key == "b" {
                    bail!("cannot reduce b");
                }
                Ok(())
            },
            2,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("cannot reduce b"));
    }

    #[test]
    fn duplicate_reduce_keys_stay_separate() {
        let out = execute(
            &sample(),
            identity,
            1,
            |group, emit| {
                for value in &group.values {
                    emit.emit("same", value.clone())?;
                }
                Ok(())
            },
            2,
        )
        .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.key == "same" && r.values.len() == 1));
    }

    #[test]
    fn mapper_count_does_not_change_groups() {
        let input: Vec<_> = (0..500)
            .map(|i| KeyValue::new(format!("doc{i}"), format!("w{} w{}", i % 13, i % 5)))
            .collect();
        let words = |kv: &KeyValue, emit: &mut Emitter<'_>| -> Result<()> {
            for word in kv.value.split(|b| *b == b' ') {
                emit.emit(Bytes::copy_from_slice(word), kv.key())?;
            }
            Ok(())
        };
        let sizes = |group: &Group, emit: &mut Emitter<'_>| -> Result<()> {
            emit.emit(group.key.clone(), group.values.len().to_string())?;
            Ok(())
        };

        let serial = execute(&input, words, 1, sizes, 1).unwrap();
        let parallel = execute(&input, words, 8, sizes, 3).unwrap();
        let as_map = |records: Vec<OutputRecord>| -> BTreeMap<Bytes, Vec<Bytes>> {
            records.into_iter().map(|r| (r.key, r.values)).collect()
        };
        assert_eq!(as_map(serial), as_map(parallel));
    }
}
