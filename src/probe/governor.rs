//! Concurrency governor for probe runs.
//!
//! A fixed pool of slots backed by a tokio [`Semaphore`]. A probe may only be
//! spawned while its request holds a [`ProbeSlot`]; the slot goes back to the
//! pool when it is dropped, so every exit path (success, timeout, spawn
//! failure, panic, cancelled request) releases it exactly once.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::GovernorConfig;

/// How a request behaves when every slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Reject at once.
    FailFast,
    /// Wait up to the given duration for a slot, then reject.
    Queue(Duration),
}

impl AdmissionPolicy {
    /// A zero wait means fail fast.
    pub fn from_wait(wait: Duration) -> Self {
        if wait.is_zero() {
            AdmissionPolicy::FailFast
        } else {
            AdmissionPolicy::Queue(wait)
        }
    }
}

/// All slots are in use and none freed up within the admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("all {limit} probe slots are busy")]
pub struct Overloaded {
    pub limit: usize,
}

/// Permission to run one probe. Released on drop.
#[derive(Debug)]
pub struct ProbeSlot {
    _permit: OwnedSemaphorePermit,
}

impl ProbeSlot {
    /// Return the slot to the pool. The permit is released when the slot is dropped.
    pub fn release(self) {}
}

#[derive(Clone, Debug)]
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    limit: usize,
    policy: AdmissionPolicy,
}

impl ConcurrencyGovernor {
    pub fn new(limit: usize, policy: AdmissionPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            policy,
        }
    }

    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new(
            config.max_concurrent,
            AdmissionPolicy::from_wait(config.queue_timeout()),
        )
    }

    /// Take a slot according to the admission policy.
    pub async fn acquire(&self) -> Result<ProbeSlot, Overloaded> {
        let overloaded = Overloaded { limit: self.limit };

        let permit = match self.policy {
            AdmissionPolicy::FailFast => match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                    tracing::warn!(limit = self.limit, "Probe slots exhausted, rejecting");
                    return Err(overloaded);
                }
            },
            AdmissionPolicy::Queue(wait) => {
                match tokio::time::timeout(wait, self.semaphore.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_closed)) => return Err(overloaded),
                    Err(_elapsed) => {
                        tracing::warn!(
                            limit = self.limit,
                            wait_ms = wait.as_millis() as u64,
                            "Timed out waiting for a probe slot"
                        );
                        return Err(overloaded);
                    }
                }
            }
        };

        tracing::debug!(available = self.available(), "Probe slot acquired");
        Ok(ProbeSlot { _permit: permit })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_policy_from_wait() {
        assert_eq!(AdmissionPolicy::from_wait(Duration::ZERO), AdmissionPolicy::FailFast);
        assert_eq!(
            AdmissionPolicy::from_wait(Duration::from_millis(10)),
            AdmissionPolicy::Queue(Duration::from_millis(10))
        );
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_when_full() {
        let governor = ConcurrencyGovernor::new(2, AdmissionPolicy::FailFast);
        let a = governor.acquire().await.unwrap();
        let _b = governor.acquire().await.unwrap();
        assert_eq!(governor.available(), 0);

        assert_eq!(governor.acquire().await.unwrap_err(), Overloaded { limit: 2 });

        a.release();
        assert_eq!(governor.available(), 1);
        assert!(governor.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_queue_times_out() {
        let governor =
            ConcurrencyGovernor::new(1, AdmissionPolicy::Queue(Duration::from_millis(50)));
        let _held = governor.acquire().await.unwrap();
        assert!(governor.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_queue_succeeds_when_slot_frees() {
        let governor = ConcurrencyGovernor::new(1, AdmissionPolicy::Queue(Duration::from_secs(5)));
        let held = governor.acquire().await.unwrap();

        let waiter = {
            let governor = governor.clone();
            tokio::spawn(async move { governor.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(governor.available(), 1);
    }

    #[tokio::test]
    async fn test_slot_released_on_panic() {
        let governor = ConcurrencyGovernor::new(1, AdmissionPolicy::FailFast);
        let task = {
            let governor = governor.clone();
            tokio::spawn(async move {
                let _slot = governor.acquire().await.unwrap();
                panic!("probe handler blew up");
            })
        };
        assert!(task.await.is_err());
        assert_eq!(governor.available(), 1);
    }

    #[tokio::test]
    async fn test_never_oversubscribed() {
        let governor = ConcurrencyGovernor::new(3, AdmissionPolicy::Queue(Duration::from_secs(10)));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let governor = governor.clone();
            let running = running.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _slot = governor.acquire().await.unwrap();
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(governor.available(), 3);
    }
}
