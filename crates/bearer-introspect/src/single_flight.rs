//! Single-flight coordination of concurrent computations per key
//!
//! The first caller for a key (the leader) creates a lazily-driven, memoized
//! future and registers it; every caller arriving while it is outstanding (a
//! follower) awaits that same future. The entry is removed once the flight
//! settles, so this deduplicates requests close together in time and is not a
//! cache.
//!
//! ```text
//! caller A ──┐
//! caller B ──┼──► flights[key] ──► compute() (once) ──► T (cloned to A, B, C)
//! caller C ──┘
//! ```
//!
//! Insert-if-absent and remove-after-settle go through the map's entry lock for
//! that key only; the lock is never held across an await.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::trace;

use crate::introspection_metrics as metrics;

type Flight<T> = Shared<BoxFuture<'static, T>>;

/// Table of in-flight computations keyed by string
///
/// Clones share the same table.
pub struct SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    flights: Arc<DashMap<String, Flight<T>>>,
}

impl<T> Clone for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.len())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Await the flight for `key`, starting one with `compute` if none is outstanding.
    ///
    /// `compute` is invoked only by the leader. Its synchronous part runs while
    /// the entry for `key` is locked and must not call back into this table.
    pub async fn coordinate<F, Fut>(&self, key: &str, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = match self.flights.entry(key.to_owned()) {
            Entry::Occupied(entry) => {
                trace!("joining in-flight computation");
                metrics::record_single_flight(false);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                trace!("starting new flight");
                metrics::record_single_flight(true);
                let flight = compute().boxed().shared();
                entry.insert(flight.clone());
                flight
            }
        };

        let mut guard = FlightGuard {
            flights: &self.flights,
            key,
            waiter: flight.clone(),
            flight,
            settled: false,
        };
        let value = (&mut guard.waiter).await;
        guard.settled = true;
        value
    }

    /// Whether a flight for `key` is outstanding
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of outstanding flights
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Whether no flight is outstanding
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Removes the flight from the table when the waiter finishes or is dropped.
struct FlightGuard<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    flights: &'a DashMap<String, Flight<T>>,
    key: &'a str,
    /// Handle kept unpolled for identity checks against the table
    flight: Flight<T>,
    /// Handle this waiter polls
    waiter: Flight<T>,
    settled: bool,
}

impl<T> Drop for FlightGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let settled = self.settled || self.flight.peek().is_some();
        // Unsettled: abandoned when only the table and this guard's two handles remain
        let abandoned = !settled && self.flight.strong_count().is_some_and(|count| count <= 3);

        if settled || abandoned {
            self.flights
                .remove_if(self.key, |_, current| current.ptr_eq(&self.flight));
        }
    }
}
