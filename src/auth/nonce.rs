use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Nonces accepted by the auth gate, with the time each was first seen.
///
/// Constructed at startup, shared by every verification, and swept by a
/// background task. Lookups and inserts go through one mutex so two
/// requests carrying the same nonce cannot both be accepted.
pub struct NonceStore {
    retention_ms: i64,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NonceStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention_ms: i64::try_from(retention.as_millis()).unwrap_or(i64::MAX),
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn within(&self, first_seen: DateTime<Utc>, now: DateTime<Utc>, window_ms: i64) -> bool {
        (now - first_seen).num_milliseconds() <= window_ms
    }

    /// True if `nonce` was recorded within the retention window.
    pub fn contains(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        self.lock()
            .get(nonce)
            .is_some_and(|first| self.within(*first, now, self.retention_ms))
    }

    /// Record `nonce` as used. Returns false if it was already recorded
    /// within the retention window, in which case nothing changes.
    pub fn record(&self, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.lock();
        match seen.get(nonce) {
            Some(first) if self.within(*first, now, self.retention_ms) => false,
            _ => {
                seen.insert(nonce.to_string(), now);
                true
            }
        }
    }

    /// Drop records older than twice the retention window.
    /// Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.retention_ms.saturating_mul(2);
        let mut seen = self.lock();
        let before = seen.len();
        seen.retain(|_, first| self.within(*first, now, horizon));
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sweep every `every` until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.sweep(Utc::now());
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "swept expired nonces");
                }
            }
        })
    }
}
