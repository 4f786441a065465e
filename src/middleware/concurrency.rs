// Concurrency limiter for heavy (provider-calling) operations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::utils::Metrics;

/// Bounds how many heavy operations run at once, system-wide.
///
/// Ordering between waiters is whatever tokio's semaphore provides; only the
/// number of simultaneous holders is bounded.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    metrics: Option<Metrics>,
}

/// Held for the full duration of a heavy operation; releases on drop.
pub struct HeavyPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
    metrics: Option<Metrics>,
}

impl Drop for HeavyPermit {
    fn drop(&mut self) {
        let now = self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
        if let Some(ref m) = self.metrics {
            m.set_concurrency_in_flight(now);
        }
    }
}

impl ConcurrencyLimiter {
    /// `capacity` must not exceed `Semaphore::MAX_PERMITS`; config validation enforces it
    pub fn new(capacity: usize, metrics: Option<Metrics>) -> Self {
        if let Some(ref m) = metrics {
            m.set_concurrency_capacity(capacity);
            m.set_concurrency_in_flight(0);
        }
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> HeavyPermit {
        // The semaphore is owned here and never closed
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("concurrency semaphore closed"),
        };
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(ref m) = self.metrics {
            m.set_concurrency_in_flight(now);
        }
        debug!("Heavy operation started ({}/{} in flight)", now, self.capacity);

        HeavyPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
            metrics: self.metrics.clone(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Operations currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_capacity_in_flight() {
        let limiter = ConcurrencyLimiter::new(2, None);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (release_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let mut release = release_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Hold the slot until released or a short pause passes
                tokio::select! {
                    _ = release.recv() => {}
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                }
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.in_flight(), 2);
        assert_eq!(limiter.available(), 0);
        let _ = release_tx.send(());

        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_permit_released_on_error_path() {
        let limiter = ConcurrencyLimiter::new(1, None);

        async fn failing(limiter: &ConcurrencyLimiter) -> Result<(), &'static str> {
            let _permit = limiter.acquire().await;
            Err("upstream failed")
        }

        assert!(failing(&limiter).await.is_err());
        assert_eq!(limiter.in_flight(), 0);

        // Slot is usable again
        let permit = tokio::time::timeout(Duration::from_millis(100), limiter.acquire()).await;
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_gauge_follows_permits() {
        let metrics = Metrics::new();
        let limiter = ConcurrencyLimiter::new(3, Some(metrics.clone()));
        assert_eq!(metrics.snapshot().concurrency_capacity, 3);

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert_eq!(metrics.snapshot().concurrency_in_flight, 2);

        drop(first);
        assert_eq!(metrics.snapshot().concurrency_in_flight, 1);
        drop(second);
        assert!(metrics.to_prometheus().contains("concurrency_in_flight 0\n"));
    }
}
