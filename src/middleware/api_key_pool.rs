// Round-robin API key pool
//
// Hands out provider keys in insertion order, wrapping around at the end

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::core::config::mask_key;

/// Fixed pool of provider keys with a shared rotation cursor.
///
/// The cursor is a single atomic counter, so concurrent callers on different
/// worker threads each observe a distinct position without taking a lock.
pub struct ApiKeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        if keys.is_empty() {
            warn!("API key pool created without any keys");
        }

        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next key in rotation, or `None` when the pool is empty
    pub fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }

        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        let key = &self.keys[position];
        debug!("Using API key {} ({})", position, mask_key(key));
        Some(key.clone())
    }

    /// Get total number of keys
    pub fn total_keys(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Masked suffix of every key, for health output
    pub fn masked_keys(&self) -> Vec<String> {
        self.keys.iter().map(|k| mask_key(k)).collect()
    }
}
