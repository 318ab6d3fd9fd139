//! Request coalescing keyed by an arbitrary id.
//!
//! The first caller for a key installs a shared future and spawns it on the
//! runtime; later callers for the same key await that same future. The work
//! removes its own map entry once it finishes, so the next call after
//! completion starts a fresh flight. Spawning means the work always runs to
//! completion and releases whatever it holds, even when every waiter has
//! gone away.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

type Flight<V> = Shared<BoxFuture<'static, V>>;

/// Coalesces concurrent work for the same key into one execution.
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    inflight: Arc<DashMap<K, Flight<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Run `work` for `key`, or join the flight already running for it.
    ///
    /// `work` is only invoked when no flight exists for `key`.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let flight = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let inflight = Arc::clone(&self.inflight);
                let fut = work();
                let flight = async move {
                    let value = fut.await;
                    inflight.remove(&key);
                    value
                }
                .boxed()
                .shared();
                entry.insert(flight.clone());
                // Keep driving the flight if every waiter is dropped.
                tokio::spawn(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Number of keys with a flight in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
