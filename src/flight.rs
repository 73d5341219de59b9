//! Singleflight: one backend query per cache key at a time.
//!
//! Concurrent cache misses on the same [`CacheKey`] would otherwise each
//! query the backend, defeating the cache's purpose under polling load. The
//! first task to miss becomes the leader; the rest wait for its completion
//! and re-run the cache lookup.
//!
//! The completion latch is a [`CancellationToken`] rather than a `Notify`:
//! a token cancelled before a waiter subscribes still resolves immediately,
//! so there is no lost-wakeup window between observing the in-flight entry
//! and awaiting it. Leadership is released on [`FlightGuard`] drop, which
//! also covers the leader's task dying.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::cache::CacheKey;

/// In-flight backend queries keyed by cache identity.
///
/// Cheap to clone; all clones share the in-flight map.
#[derive(Debug, Clone, Default)]
pub(crate) struct Flight {
    in_flight: Arc<Mutex<HashMap<CacheKey, CancellationToken>>>,
}

/// Outcome of trying to start a query for a key.
pub(crate) enum Entry {
    /// This task owns the backend query; drop the guard when done.
    Leader(FlightGuard),
    /// Another task owns it; await the token, then look up the cache again.
    Waiter(CancellationToken),
}

impl Flight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim the key, or join the task that already has.
    pub(crate) fn begin(&self, key: &CacheKey) -> Entry {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(done) = in_flight.get(key) {
            return Entry::Waiter(done.clone());
        }
        let done = CancellationToken::new();
        in_flight.insert(key.clone(), done.clone());
        Entry::Leader(FlightGuard {
            flight: self.clone(),
            key: key.clone(),
            done,
        })
    }
}

/// Leadership over one in-flight key. Dropping releases the key and wakes
/// every waiter.
pub(crate) struct FlightGuard {
    flight: Flight,
    key: CacheKey,
    done: CancellationToken,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flight.in_flight.lock().unwrap().remove(&self.key);
        self.done.cancel();
    }
}
