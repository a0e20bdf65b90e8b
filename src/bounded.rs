//! Length caps for keys and values.
//!
//! Every key and value that moves through the engine is capped. A cap of
//! `n` leaves room for `n - 1` bytes of content plus a terminator, so
//! anything longer is cut down to at most `n - 1` bytes. Truncation is
//! silent. Valid UTF-8 is cut at the last character boundary that fits,
//! anything else is cut on raw bytes.

use anyhow::{ensure, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Default cap for keys, terminator included.
pub const MAX_KEY_LEN: usize = 128;
/// Default cap for values, terminator included.
pub const MAX_VALUE_LEN: usize = 256;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_key_len: usize,
    pub max_value_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_key_len: MAX_KEY_LEN,
            max_value_len: MAX_VALUE_LEN,
        }
    }
}

impl Limits {
    pub fn new(max_key_len: usize, max_value_len: usize) -> Result<Self> {
        let limits = Self {
            max_key_len,
            max_value_len,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Both caps must leave room for the terminator.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_key_len > 0, "max key length must be at least 1");
        ensure!(self.max_value_len > 0, "max value length must be at least 1");
        Ok(())
    }

    #[inline]
    pub fn bound_key(&self, key: Bytes) -> Bytes {
        truncate(key, self.max_key_len)
    }

    #[inline]
    pub fn bound_value(&self, value: Bytes) -> Bytes {
        truncate(value, self.max_value_len)
    }

    /// Applies both caps to a pair. Slicing [`Bytes`] does not copy.
    pub fn bound(&self, kv: KeyValue) -> KeyValue {
        KeyValue {
            key: self.bound_key(kv.key),
            value: self.bound_value(kv.value),
        }
    }
}

/// Cuts `value` down to at most `cap - 1` bytes.
///
/// When `value` is valid UTF-8 the cut backs off to a character boundary,
/// so the result stays valid UTF-8.
pub fn truncate(value: Bytes, cap: usize) -> Bytes {
    let max_len = cap.saturating_sub(1);
    if value.len() <= max_len {
        return value;
    }
    let end = match std::str::from_utf8(&value) {
        Ok(text) => (0..=max_len)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0),
        Err(_) => max_len,
    };
    value.slice(..end)
}
