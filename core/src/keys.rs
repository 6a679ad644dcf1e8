//! API key pool with cyclic rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{QgenError, Result};

/// Ordered, immutable pool of API keys with a cursor that cycles
/// indefinitely. Rotation wraps to the start after the last key.
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
    rotations: AtomicUsize
}

impl KeyPool {
    /// Creates a pool from an ordered list of keys.
    ///
    /// An empty list is a fatal configuration error, not a runtime error.
    pub fn new(keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(QgenError::configuration("API key pool is empty"));
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
            rotations: AtomicUsize::new(0)
        })
    }

    /// Returns the current key.
    pub fn current(&self) -> &str {
        &self.keys[self.cursor.load(Ordering::SeqCst) % self.keys.len()]
    }

    /// Advances the cursor one position, wrapping cyclically, and returns
    /// the new current key.
    pub fn rotate(&self) -> &str {
        let next = self.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        self.rotations.fetch_add(1, Ordering::SeqCst);
        let key = &self.keys[next % self.keys.len()];
        tracing::info!(suffix = %redact(key), "Rotated API key");
        key
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Total rotations performed since construction.
    pub fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

/// Last four characters of a key, for log lines.
fn redact(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}
