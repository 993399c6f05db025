//! Retry policy applied around every request phase.
//!
//! Every [`PhaseError`] is treated the same way: the phase is attempted again
//! after a backoff delay until it succeeds or the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Phase, PhaseError, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy, mostly useful in tests.
    pub fn immediate(max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);

        if !self.jitter || delay.is_zero() {
            return delay;
        }

        // Uniform in [delay/2, delay]. The random bits of a v4 uuid are the
        // randomness source.
        let half = delay / 2;
        let span = (delay - half).as_nanos() as u64;
        let random = uuid::Uuid::new_v4().as_u128() as u64;
        half + Duration::from_nanos(random % (span + 1))
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Runs `op` until it succeeds or the policy gives up.
    ///
    /// `context` is only used for diagnostics (endpoint and path of the entry).
    pub async fn run<T, F, Fut>(
        &self,
        phase: Phase,
        context: &str,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PhaseError>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(%phase, attempts, context, "Phase succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) if self.exhausted(attempts) => {
                    warn!(%phase, attempts, context, error = %e, "Giving up on phase");
                    return Err(SyncError::PermanentFailure {
                        phase,
                        attempts,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let delay = self.backoff(attempts);
                    warn!(
                        %phase,
                        attempt = attempts,
                        context,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
