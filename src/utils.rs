//! Utility functions that may be helpful for implementing
//! and testing MapReduce workloads.
//!

use anyhow::Result;
use bytes::Bytes;

use crate::{KeyValue, OutputRecord};

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Returns an error if the slice contains invalid UTF-8. Keep in mind
/// that a truncated key or value may end in the middle of a character.
pub fn string_from_bytes(buf: Bytes) -> Result<String> {
    Ok(String::from_utf8(buf.as_ref().into())?)
}

/// Builds input records from `(key, value)` string pairs.
pub fn records<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<KeyValue> {
    pairs
        .into_iter()
        .map(|(key, value)| KeyValue::new(key.to_owned(), value.to_owned()))
        .collect()
}

/// Flattens output records into lossy `(key, value)` strings, one per value.
pub fn output_strings(records: &[OutputRecord]) -> Vec<(String, String)> {
    records
        .iter()
        .flat_map(|record| {
            let key = String::from_utf8_lossy(&record.key).into_owned();
            record
                .values
                .iter()
                .map(move |value| (key.clone(), String::from_utf8_lossy(value).into_owned()))
        })
        .collect()
}
