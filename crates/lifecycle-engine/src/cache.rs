//! Signature-keyed cache for parsed configuration.

use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug)]
struct Entry<T> {
    signature: String,
    value: Arc<T>,
}

/// Holds the last successfully parsed value of one configuration class together with the
/// signature of the files it was parsed from.
///
/// An entry is valid exactly while a freshly computed signature equals the stored one.
/// Concurrent refreshes may both parse and both `put`; the values are equivalent, so the
/// last writer wins without harm.
#[derive(Debug)]
pub struct ConfigCache<T> {
    entry: RwLock<Option<Entry<T>>>,
}

impl<T> Default for ConfigCache<T> {
    fn default() -> Self {
        Self {
            entry: RwLock::new(None),
        }
    }
}

impl<T> ConfigCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value, if it was stored under `signature`.
    pub fn get(&self, signature: &str) -> Option<Arc<T>> {
        self.entry
            .read()
            .as_ref()
            .filter(|e| e.signature == signature)
            .map(|e| Arc::clone(&e.value))
    }

    /// Store `value` under `signature`, replacing any previous entry.
    pub fn put(&self, signature: impl Into<String>, value: Arc<T>) {
        *self.entry.write() = Some(Entry {
            signature: signature.into(),
            value,
        });
    }

    /// Drop the cached entry so the next lookup misses.
    pub fn invalidate(&self) {
        *self.entry.write() = None;
    }

    /// Signature of the cached entry.
    pub fn signature(&self) -> Option<String> {
        self.entry.read().as_ref().map(|e| e.signature.clone())
    }
}
