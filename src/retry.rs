use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use strum_macros::{Display, EnumIter};
use tracing::{debug, warn};

/// Connection steps that each own an independent retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SyncStep {
    Login,
    SetAttributes,
    JoinChannel,
    FetchMembers,
    FetchChannelAttributes,
}

/// Unbounded doubling delay attached to one connection step.
///
/// A failure hands out the current delay and doubles it for the next
/// failure; a success resets it to the initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    initial: Duration,
    delay: Duration,
    max_delay: Option<Duration>,
    failures: u32,
}

impl RetryBudget {
    pub fn new(initial: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            initial,
            delay: initial,
            max_delay,
            failures: 0,
        }
    }

    /// Delay that will be waited after the next failure
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt and return how long to wait before retrying
    pub fn record_failure(&mut self) -> Duration {
        let wait = self.delay;
        let doubled = self.delay.saturating_mul(2);
        self.delay = match self.max_delay {
            Some(max) => doubled.min(max),
            None => doubled,
        };
        self.failures += 1;
        wait
    }

    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.failures = 0;
    }
}

/// Randomisation applied to bounded backoff delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    #[default]
    None,
    /// Uniformly random delay between zero and the computed delay
    Full,
}

/// Bounded exponential backoff used for per-member attribute fetches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Option<Duration>,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            multiplier: 2,
            max_delay: None,
            jitter: Jitter::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given retry (1 = first retry), before jitter
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        let calculated = self.initial_delay.saturating_mul(factor);
        match self.max_delay {
            Some(max) => calculated.min(max),
            None => calculated,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        match self.jitter {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = delay.as_millis() as u64;
                Duration::from_millis(rand::rng().random_range(0..=millis))
            }
        }
    }

    /// Run `op` until it succeeds, the attempt limit is reached, or
    /// `is_cancelled` reports true after a wait. Returns the last error
    /// when giving up.
    pub async fn retry<T, E, F, Fut, C>(
        &self,
        label: &str,
        mut op: F,
        is_cancelled: C,
    ) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn() -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label = label, attempt = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.jittered(self.delay_for_retry(attempt));
                    debug!(
                        label = label,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "[retrying] attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                    if is_cancelled() {
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        label = label,
                        attempts = attempt,
                        error = %e,
                        "Giving up after bounded retries"
                    );
                    return Err(e);
                }
            }
        }
    }
}
