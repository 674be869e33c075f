//! Supervised restart of long-running channel loops.
//!
//! A polling loop that fails (network trouble, an API error, or a 409 because
//! another instance holds the update stream) is restarted after an
//! exponential backoff with jitter. A run that stayed up for a while resets
//! the backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Restart behavior for a supervised loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (milliseconds).
    pub max_delay_ms: u64,
    /// Consecutive failures tolerated before giving up. 0 means never give up.
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0) added on top of the computed delay.
    pub jitter_factor: f64,
    /// A run lasting at least this long counts as healthy and resets the backoff.
    pub healthy_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_attempts: 0,
            jitter_factor: 0.25,
            healthy_after: Duration::from_secs(300),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart number `attempt` (0-based).
    ///
    /// `min(base * 2^attempt, max)` plus up to `jitter_factor` of that.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp_delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        let capped_delay_ms = exp_delay_ms.min(self.max_delay_ms);

        let jitter_range = (capped_delay_ms as f64 * self.jitter_factor.clamp(0.0, 1.0)) as u64;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..=jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay_ms.saturating_add(jitter))
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures > self.max_attempts
    }
}

/// How a supervised loop ended.
#[derive(Debug)]
pub enum SupervisorExit {
    /// The loop returned normally.
    Stopped,
    /// Too many consecutive failures.
    GaveUp { failures: u32, last_error: ChannelError },
}

/// Run `task` until it returns `Ok`, restarting it on error according to
/// `policy`.
pub async fn supervise<F, Fut>(name: &str, policy: &RestartPolicy, mut task: F) -> SupervisorExit
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ChannelError>>,
{
    let mut failures: u32 = 0;

    loop {
        let started = Instant::now();
        let error = match task().await {
            Ok(()) => {
                tracing::info!(channel = name, "Channel loop stopped");
                return SupervisorExit::Stopped;
            }
            Err(e) => e,
        };

        if started.elapsed() >= policy.healthy_after {
            failures = 0;
        }
        failures += 1;

        if policy.exhausted(failures) {
            tracing::error!(
                channel = name,
                failures,
                error = %error,
                "Channel loop failed too many times, giving up"
            );
            return SupervisorExit::GaveUp {
                failures,
                last_error: error,
            };
        }

        let delay = policy.delay(failures - 1);
        match &error {
            ChannelError::Conflict { .. } => tracing::warn!(
                channel = name,
                delay_ms = delay.as_millis() as u64,
                "Another instance is receiving updates, restarting after backoff"
            ),
            other => tracing::warn!(
                channel = name,
                failures,
                delay_ms = delay.as_millis() as u64,
                error = %other,
                "Channel loop failed, restarting"
            ),
        }
        tokio::time::sleep(delay).await;
    }
}
