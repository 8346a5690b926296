//! Single-flight table — at most one in-progress computation per key.
//!
//! The first caller for a key becomes the leader and spawns the work as a
//! detached task; later callers attach to the same flight and receive a clone
//! of its result. Each attached caller holds a waiter guard. When the last
//! guard drops before the result is published, the flight's cancellation
//! token fires.
//!
//! Only the flight task frees its key, so a cancelled flight still occupies
//! the table until its work has wound down. Callers arriving in that window
//! wait for it to finish and then start a fresh flight.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out waiting for in-flight result")]
    TimedOut,
    #[error("waiter cancelled")]
    Cancelled,
    /// The flight task ended without publishing (panicked or was aborted).
    #[error("flight ended without a result")]
    Abandoned,
}

struct Flight<V> {
    result: watch::Receiver<Option<V>>,
    waiters: AtomicUsize,
    cancel: CancellationToken,
}

type FlightMap<K, V> = Arc<Mutex<HashMap<K, Arc<Flight<V>>>>>;

fn lock<K, V>(flights: &FlightMap<K, V>) -> MutexGuard<'_, HashMap<K, Arc<Flight<V>>>> {
    flights.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SingleFlight<K, V> {
    flights: FlightMap<K, V>,
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            flights: self.flights.clone(),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Display + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches to the flight for `key`, starting one with `work` if none is running.
    /// `work` only runs when this caller becomes the leader. A flight that has
    /// already been cancelled is not joined; this waits for it to end first.
    pub async fn join<F, Fut>(&self, key: K, work: F) -> FlightHandle<K, V>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        loop {
            let mut winding_down = {
                let mut flights = lock(&self.flights);
                let existing = flights.get(&key).cloned();
                match existing {
                    Some(flight) if !flight.cancel.is_cancelled() => {
                        flight.waiters.fetch_add(1, Ordering::AcqRel);
                        drop(flights);
                        debug!("Joining in-flight generation for {key}");
                        return FlightHandle {
                            receiver: flight.result.clone(),
                            guard: WaiterGuard {
                                flight,
                                flights: self.flights.clone(),
                            },
                            leader: false,
                        };
                    }
                    Some(flight) => flight.result.clone(),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        let flight = Arc::new(Flight {
                            result: receiver.clone(),
                            waiters: AtomicUsize::new(1),
                            cancel: CancellationToken::new(),
                        });
                        flights.insert(key.clone(), flight.clone());
                        drop(flights);

                        let fut = work(flight.cancel.clone());
                        self.spawn_flight(key, flight.clone(), sender, fut);
                        return FlightHandle {
                            receiver,
                            guard: WaiterGuard {
                                flight,
                                flights: self.flights.clone(),
                            },
                            leader: true,
                        };
                    }
                }
            };

            debug!("Waiting for cancelled flight on {key} to wind down");
            // Either outcome means the old task is gone and has freed the key.
            let _ = winding_down.wait_for(Option::is_some).await;
        }
    }

    fn spawn_flight<Fut>(
        &self,
        key: K,
        flight: Arc<Flight<V>>,
        sender: watch::Sender<Option<V>>,
        work: Fut,
    ) where
        Fut: Future<Output = V> + Send + 'static,
    {
        let release = KeyRelease {
            key,
            flight,
            flights: self.flights.clone(),
        };
        tokio::spawn(async move {
            let value = work.await;
            // Free the key before publishing so anyone woken by the result
            // finds the table clear.
            drop(release);
            sender.send_replace(Some(value));
        });
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.flights).contains_key(key)
    }

    /// Number of keys with a flight in progress.
    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        lock(&self.flights).len()
    }
}

/// Owned by the flight task. Dropping it, on completion or on unwind, frees the key.
struct KeyRelease<K: Eq + Hash, V> {
    key: K,
    flight: Arc<Flight<V>>,
    flights: FlightMap<K, V>,
}

impl<K: Eq + Hash, V> Drop for KeyRelease<K, V> {
    fn drop(&mut self) {
        let mut flights = lock(&self.flights);
        if flights
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            flights.remove(&self.key);
        }
    }
}

/// One caller's attachment to a flight. Dropping it detaches the caller.
pub struct FlightHandle<K: Eq + Hash, V> {
    receiver: watch::Receiver<Option<V>>,
    guard: WaiterGuard<K, V>,
    leader: bool,
}

impl<K: Eq + Hash, V: Clone> FlightHandle<K, V> {
    /// True when this caller started the flight.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Waits for the flight's result. `deadline` bounds the wait; `cancel`
    /// detaches this caller early without affecting other waiters.
    pub async fn wait(
        self,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<V, WaitError> {
        let FlightHandle {
            mut receiver,
            guard,
            ..
        } = self;
        let published = async {
            match receiver.wait_for(Option::is_some).await {
                Ok(value) => (*value).clone().ok_or(WaitError::Abandoned),
                Err(_) => Err(WaitError::Abandoned),
            }
        };

        let outcome = tokio::select! {
            biased;
            result = async {
                match deadline {
                    Some(limit) => tokio::time::timeout(limit, published)
                        .await
                        .unwrap_or(Err(WaitError::TimedOut)),
                    None => published.await,
                }
            } => result,
            _ = cancel.cancelled() => Err(WaitError::Cancelled),
        };

        drop(guard);
        outcome
    }
}

struct WaiterGuard<K: Eq + Hash, V> {
    flight: Arc<Flight<V>>,
    flights: FlightMap<K, V>,
}

impl<K: Eq + Hash, V> Drop for WaiterGuard<K, V> {
    fn drop(&mut self) {
        // Held so a concurrent join cannot attach between the count reaching
        // zero and the token firing.
        let _flights = lock(&self.flights);
        let remaining = self.flight.waiters.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.flight.result.borrow().is_none() {
            self.flight.cancel.cancel();
        }
    }
}
