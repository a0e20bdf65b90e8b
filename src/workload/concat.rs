//! Identity map and a reduce that concatenates every value of a key.
//!
//! Values are concatenated in byte order so the result does not depend on
//! how the map stage was scheduled.

use crate::*;
use anyhow::Result;
use bytes::{Bytes, BytesMut};

pub fn map(kv: &KeyValue, _aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    emit.emit(kv.key(), kv.value())?;
    Ok(())
}

pub fn reduce(group: &Group, _aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    let mut values = group.values.clone();
    values.sort_unstable();
    let mut writer = BytesMut::with_capacity(values.iter().map(Bytes::len).sum());
    for value in values {
        writer.extend_from_slice(&value);
    }
    emit.emit(group.key.clone(), writer.freeze())?;
    Ok(())
}
