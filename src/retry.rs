//! Retry engine
//!
//! One suspending executor shared by every remote call site. A `RetryPolicy`
//! decides how many attempts to make, how long to back off between them and
//! which failures are worth retrying at all.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::ProviderError;

/// Decides whether a failed attempt may be retried
pub type RetryClassifier = fn(&ProviderError) -> bool;

/// Retry on connection failures, timeouts and 5xx
pub fn retry_transient(error: &ProviderError) -> bool {
    error.is_transient()
}

/// Also retry on 4xx; streaming hosts block transiently and recover
pub fn retry_transient_or_client(error: &ProviderError) -> bool {
    error.is_transient() || error.status().is_some_and(|s| s >= 400)
}

/// Backoff parameters for one class of remote call
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub name: &'static str,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Upper bound of the uniform random delay added to every backoff
    pub jitter: Duration,
    pub should_retry: RetryClassifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

const DEFAULT_JITTER: Duration = Duration::from_millis(1000);

impl RetryPolicy {
    /// Catalog reads (home, search, detail, episode lists)
    pub fn critical() -> Self {
        Self {
            name: "critical",
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            backoff_factor: 2.0,
            jitter: DEFAULT_JITTER,
            should_retry: retry_transient,
        }
    }

    /// Streaming index and watch calls
    pub fn streaming() -> Self {
        Self {
            name: "streaming",
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            backoff_factor: 1.5,
            jitter: DEFAULT_JITTER,
            should_retry: retry_transient_or_client,
        }
    }

    /// Image probes
    pub fn images() -> Self {
        Self {
            name: "images",
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
            backoff_factor: 2.0,
            jitter: DEFAULT_JITTER,
            should_retry: retry_transient,
        }
    }

    /// Non-critical background reads
    pub fn optional() -> Self {
        Self {
            name: "optional",
            max_attempts: 2,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(4000),
            backoff_factor: 2.0,
            jitter: DEFAULT_JITTER,
            should_retry: retry_transient,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_classifier(mut self, should_retry: RetryClassifier) -> Self {
        self.should_retry = should_retry;
        self
    }

    /// Backoff before attempt `attempt + 1`, without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.delay_for_attempt(attempt) + Duration::from_millis(extra)
    }

    /// Run `operation` under this policy
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute_with(operation, |_, _| {}).await
    }

    /// Run `operation`, calling `on_retry(attempt, error)` before each backoff
    ///
    /// The hook observes only; it cannot change whether a retry happens.
    pub async fn execute_with<T, F, Fut, H>(
        &self,
        mut operation: F,
        mut on_retry: H,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        H: FnMut(u32, &ProviderError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= max_attempts || !(self.should_retry)(&error) {
                        return Err(error);
                    }

                    let delay = self.jittered_delay(attempt);
                    warn!(
                        policy = self.name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying remote call"
                    );
                    on_retry(attempt, &error);

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
