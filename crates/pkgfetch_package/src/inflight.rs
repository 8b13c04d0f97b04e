//! Single-flight execution of asynchronous work.
//!
//! While an operation for a key is running, every other request for the same
//! key waits for that operation instead of starting its own, and all of them
//! observe the same result, success or failure. Nothing is remembered once
//! the operation settles: the next request for the key starts fresh.
use std::{
    future::Future,
    sync::{Arc, Weak},
};

use dashmap::{DashMap, Entry};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::FetchError;

type Sender<T> = broadcast::Sender<Result<T, FetchError>>;

/// Tracks in-flight operations by key. Clones share the same registry.
#[derive(Debug)]
pub struct InflightRegistry<T> {
    pending: Arc<DashMap<String, Weak<Sender<T>>>>,
}

impl<T> Clone for InflightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
        }
    }
}

impl<T> Default for InflightRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Arc::default(),
        }
    }
}

impl<T: Clone + Send + 'static> InflightRegistry<T> {
    /// Returns the result of the operation registered under `key`, running
    /// `work` to produce it if no such operation is in flight.
    ///
    /// The work runs on its own task so it always completes, even when the
    /// caller that started it stops waiting. `package` labels the error
    /// reported when the work panics.
    pub async fn run<F>(&self, key: String, package: &str, work: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let cancelled = || FetchError::Cancelled {
            package: package.to_string(),
        };

        let tx = match self.pending.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let running = entry.get().upgrade();
                match running {
                    Some(tx) => {
                        // Subscribe while holding the entry so the result
                        // cannot be sent in between.
                        let mut rx = tx.subscribe();
                        drop(entry);
                        drop(tx);
                        trace!("joining in-flight operation '{key}'");
                        return rx.recv().await.unwrap_or_else(|_| Err(cancelled()));
                    }
                    None => {
                        let tx = Arc::new(broadcast::channel(1).0);
                        entry.insert(Arc::downgrade(&tx));
                        tx
                    }
                }
            }
            Entry::Vacant(entry) => {
                let tx = Arc::new(broadcast::channel(1).0);
                entry.insert(Arc::downgrade(&tx));
                tx
            }
        };

        let mut rx = tx.subscribe();
        let guard = PendingGuard {
            pending: self.pending.clone(),
            key,
            tx: Arc::downgrade(&tx),
        };
        tokio::spawn(async move {
            let result = work.await;
            // Later requests must start new work, so unregister before the
            // result goes out.
            drop(guard);
            let _ = tx.send(result);
        });

        rx.recv().await.unwrap_or_else(|_| Err(cancelled()))
    }

    /// The number of operations currently running.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Unregisters an operation when it settles or its task unwinds.
struct PendingGuard<T> {
    pending: Arc<DashMap<String, Weak<Sender<T>>>>,
    key: String,
    tx: Weak<Sender<T>>,
}

impl<T> Drop for PendingGuard<T> {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.key, |_, current| Weak::ptr_eq(current, &self.tx));
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future::join_all;

    use super::*;

    fn counted(
        calls: &Arc<AtomicUsize>,
        result: Result<usize, FetchError>,
    ) -> impl Future<Output = Result<usize, FetchError>> + Send + 'static {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            result
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_run_once() {
        let registry = InflightRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let results = join_all((0..10).map(|i| {
            registry.run(
                "component-type@1.0.0".to_string(),
                "component-type@1.0.0",
                counted(&calls, Ok(i)),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|result| matches!(result, Ok(0))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failures_are_shared_but_not_remembered() {
        let registry = InflightRegistry::<usize>::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = || {
            Err(FetchError::Network {
                package: "owner-repo@*".to_string(),
                message: "connection reset".to_string(),
            })
        };

        let results = join_all((0..3).map(|_| {
            registry.run("key".to_string(), "owner-repo@*", counted(&calls, failure()))
        }))
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(
            results
                .iter()
                .all(|result| matches!(result, Err(FetchError::Network { .. })))
        );

        // the next request starts over
        let result = registry
            .run("key".to_string(), "owner-repo@*", counted(&calls, Ok(7)))
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let registry = InflightRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            registry.run("a".to_string(), "a", counted(&calls, Ok(1))),
            registry.run("b".to_string(), "b", counted(&calls, Ok(2))),
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_leader_still_completes() {
        let registry = InflightRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut leader = Box::pin(registry.run("key".to_string(), "key", counted(&calls, Ok(1))));
        assert!(futures::poll!(&mut leader).is_pending());
        drop(leader);
        assert_eq!(registry.len(), 1);

        let follower = registry
            .run("key".to_string(), "key", counted(&calls, Ok(2)))
            .await;
        assert_eq!(follower.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    async fn explode() -> Result<usize, FetchError> {
        panic!("work failed")
    }

    #[tokio::test]
    async fn test_panicking_work_is_cancelled() {
        let registry = InflightRegistry::<usize>::default();

        let result = registry
            .run("key".to_string(), "owner-repo@1.0.0", explode())
            .await;

        assert!(matches!(
            result,
            Err(FetchError::Cancelled { package }) if package == "owner-repo@1.0.0"
        ));
        assert!(registry.is_empty());
    }
}
