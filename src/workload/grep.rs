//! A MapReduce-compatible implementation of `grep`.
//!
//! Every matching line is emitted under its file's key and re-emitted by
//! reduce unchanged, so a file with several matches appears several times
//! in the output.

use crate::*;
use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    #[clap(short, long, value_parser)]
    term: String,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    Ok(Args::try_parse_from(serde_json::from_slice::<Vec<String>>(aux)?)?)
}

pub fn map(kv: &KeyValue, aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    let term = parse_args(aux)?.term;
    let needle = term.as_bytes();
    if needle.is_empty() || kv.value.windows(needle.len()).any(|w| w == needle) {
        emit.emit(kv.key(), kv.value())?;
    }
    Ok(())
}

pub fn reduce(group: &Group, _aux: &Bytes, emit: &mut Emitter<'_>) -> Result<()> {
    let mut lines = group.values.clone();
    lines.sort_unstable();
    for line in lines {
        emit.emit(group.key.clone(), line)?;
    }
    Ok(())
}
