//! Time-to-live guard in front of the configuration loaders.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Tracks when configuration was last successfully refreshed.
///
/// Independent of the loaders' modification-time signatures: it only bounds how long a reader
/// can be served without the loaders being asked to look at the files again.
#[derive(Debug)]
pub struct FreshnessGate {
    ttl: Duration,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl FreshnessGate {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            last_refresh: Mutex::new(None),
        }
    }

    /// Never refreshed, or refreshed more than `ttl` before `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match *self.last_refresh.lock() {
            None => true,
            Some(last) => now - last > self.ttl,
        }
    }

    pub fn mark_refreshed(&self, now: DateTime<Utc>) {
        *self.last_refresh.lock() = Some(now);
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.lock()
    }

    /// Run `refresh` if stale. The timestamp only moves when `refresh` succeeds.
    ///
    /// Returns whether a refresh was attempted.
    pub fn ensure_fresh<E>(
        &self,
        now: DateTime<Utc>,
        refresh: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        if !self.is_stale(now) {
            return Ok(false);
        }
        refresh()?;
        self.mark_refreshed(now);
        Ok(true)
    }
}
