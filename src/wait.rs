//! Bounded polling against fresh snapshots.
//!
//! Every wait in the login flow goes through [`wait_until`]: take a snapshot,
//! test it, sleep, try again, give up after a fixed number of attempts.
//! Snapshot failures count as misses and never end the loop early.

use crate::config::PollPolicy;
use crate::device::{Device, Snapshot};

/// Result of one bounded wait
#[derive(Debug, Clone)]
pub struct WaitOutcome {
    /// Snapshot that satisfied the predicate, `None` when the budget ran out
    pub snapshot: Option<Snapshot>,
    /// Snapshot requests made, failed ones included
    pub attempts: u32,
}

impl WaitOutcome {
    pub fn found(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Poll `device` until `predicate` holds or `policy.max_attempts` snapshots
/// have been requested. No sleep follows the final attempt.
pub async fn wait_until<D, P>(device: &D, policy: PollPolicy, mut predicate: P) -> WaitOutcome
where
    D: Device + ?Sized,
    P: FnMut(&Snapshot) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        match device.snapshot().await {
            Ok(snapshot) if predicate(&snapshot) => {
                tracing::debug!(attempt, "wait satisfied");
                return WaitOutcome {
                    snapshot: Some(snapshot),
                    attempts: attempt,
                };
            }
            Ok(_) => tracing::trace!(attempt, "predicate not met"),
            Err(e) => tracing::debug!(attempt, error = %e, "snapshot failed, counting as miss"),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::debug!(attempts = policy.max_attempts, "wait exhausted");
    WaitOutcome {
        snapshot: None,
        attempts: policy.max_attempts,
    }
}

/// Wait for a clickable element to show up
pub async fn wait_for_clickable<D>(device: &D, policy: PollPolicy, index: u32) -> WaitOutcome
where
    D: Device + ?Sized,
{
    wait_until(device, policy, |snap| snap.has_clickable(index)).await
}
