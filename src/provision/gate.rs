//! Bounded concurrency for provisioning calls
//!
//! The provisioner holds no limiter of its own. Callers that run many
//! provisioning or container operations at once create a gate and pass it
//! where it is needed.

use crate::error::{InvowkError, InvowkResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Caller-owned counting semaphore
#[derive(Debug, Clone)]
pub struct ProvisionGate {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl ProvisionGate {
    /// Allow at most `limit` concurrent holders (0 is treated as 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for a slot, giving up if `cancel` fires first
    pub async fn acquire(&self, cancel: &CancellationToken) -> InvowkResult<OwnedSemaphorePermit> {
        tokio::select! {
            _ = cancel.cancelled() => Err(InvowkError::cancelled("waiting for a provisioning slot")),
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| InvowkError::Internal("provisioning gate closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let gate = ProvisionGate::new(2);
        let cancel = CancellationToken::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            let cancel = cancel.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire(&cancel).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_wait_returns_error() {
        let gate = ProvisionGate::new(1);
        let cancel = CancellationToken::new();
        let _held = gate.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let err = gate.acquire(&cancel).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[test]
    fn zero_limit_is_one() {
        assert_eq!(ProvisionGate::new(0).limit(), 1);
    }
}
