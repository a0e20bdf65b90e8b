//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::Result;
use bytes::Bytes;

pub fn map(kv: &KeyValue, _aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    let s = utils::string_from_bytes(kv.value())?;
    let words = s
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase());

    for word in words {
        emit.emit(word, Bytes::from_static(b"1"))?;
    }
    Ok(())
}

pub fn reduce(group: &Group, _aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    let mut count: u64 = 0;
    for value in &group.values {
        count += std::str::from_utf8(value)?.parse::<u64>()?;
    }
    emit.emit(group.key.clone(), count.to_string())?;
    Ok(())
}
