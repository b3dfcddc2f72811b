//! Retry logic with exponential backoff.
//!
//! # Overview
//!
//! - [`RetryPolicy`]: Attempt budget and backoff settings
//! - [`ExponentialBackoff`]: Yields the sleep before each retry
//! - [`RetryController`]: Drives one logical call through its attempts
//! - [`retry`] and [`retry_with_policy`]: Wrap any client call
//!
//! A call moves `Idle -> Attempting -> (Success | Retrying | Failed)`.
//! After a failed attempt the failure is classified:
//!
//! - 401/403 and other 4xx responses fail immediately, whatever budget remains.
//! - Transport errors, timeouts and 5xx responses are retried while the
//!   budget lasts. The sleep before retry `k` (zero-indexed) is at least
//!   `base_delay * multiplier^k`.
//! - When the budget is spent the last failure is returned.
//!
//! With `max_retries = N` a persistently transient failure takes exactly
//! `N + 1` attempts. Delays never shrink from one retry to the next as long
//! as `multiplier >= 1 + jitter`, which [`RetryPolicy::validate`] enforces.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use http::StatusCode;
use socket_sdk_core::{ApiFailure, ApiResult};

use crate::ClientError;

pub mod defaults {
    use std::time::Duration;

    /// Delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_millis(100);

    pub const MULTIPLIER: f64 = 2.0;

    /// No jitter unless asked for.
    pub const JITTER: f64 = 0.0;

    /// Retries are disabled by default.
    pub const MAX_RETRIES: u32 = 0;
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `base_delay`: 100 ms
/// - `multiplier`: 2.0
/// - `jitter`: 0.0
/// - `max_delay`: none
/// - `max_retries`: 0
///
/// # Example
///
/// ```
/// use socket_sdk_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .max_retries(3)
///     .base_delay(Duration::from_millis(250))
///     .max_delay(Duration::from_secs(10))
///     .jitter(0.2);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Growth factor between consecutive delays. Must be >= `1.0 + jitter`.
    pub multiplier: f64,

    /// Extra random delay as a fraction of the computed delay, in `[0.0, 1.0]`.
    /// A value of 0.2 adds between 0% and 20%. Jitter never shortens a delay.
    pub jitter: f64,

    /// Upper bound for a single delay.
    pub max_delay: Option<Duration>,

    /// Maximum number of retries, not counting the initial attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: None,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Short delays for interactive use.
    /// - Base delay: 50ms
    /// - Max delay: 1 second
    /// - Max retries: 5
    /// - Jitter: 0.2
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Some(Duration::from_secs(1)),
            max_retries: 5,
            jitter: 0.2,
            ..Default::default()
        }
    }

    /// Long delays for background jobs such as scheduled scans.
    /// - Base delay: 2 seconds
    /// - Max delay: 5 minutes
    /// - Max retries: 10
    /// - Jitter: 0.2
    pub fn patient() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Some(Duration::from_secs(300)),
            max_retries: 10,
            jitter: 0.2,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is less than 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1.0");
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is not between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be between 0.0 and 1.0"
        );
        self.jitter = jitter;
        self
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(max_delay) = self.max_delay
            && self.base_delay > max_delay
        {
            return Err("base_delay must not exceed max_delay");
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        // A jittered delay may reach `delay * (1 + jitter)`; the next one
        // starts at `delay * multiplier`.
        if self.multiplier < 1.0 + self.jitter {
            return Err("multiplier must be at least 1.0 + jitter");
        }
        Ok(())
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// Exponential backoff with additive jitter.
///
/// The delay before retry `k` is `base * multiplier^k * (1 + jitter * r)`
/// with `r` uniform in `[0, 1)`, then capped at `max_delay`.
///
/// # Example
///
/// ```
/// use socket_sdk_client::RetryPolicy;
/// use std::time::Duration;
///
/// let mut backoff = RetryPolicy::new().base_delay(Duration::from_millis(10)).backoff();
/// assert_eq!(backoff.next_delay(), Duration::from_millis(10));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(20));
/// assert_eq!(backoff.next_delay(), Duration::from_millis(40));
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    /// Un-jittered delay for the next retry, in seconds.
    current_delay_secs: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        let current_delay_secs = policy.base_delay.as_secs_f64();
        Self {
            policy,
            current_delay_secs,
            attempts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.current_delay_secs = self.policy.base_delay.as_secs_f64();
        self.attempts = 0;
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_retries
    }

    /// Get the next delay and advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        let jittered = if self.policy.jitter > 0.0 {
            delay * (1.0 + self.policy.jitter * rand::random::<f64>())
        } else {
            delay
        };

        let clamped = match self.policy.max_delay {
            Some(max) => jittered.min(max.as_secs_f64()),
            None => jittered,
        };

        self.current_delay_secs *= self.policy.multiplier;
        if let Some(max) = self.policy.max_delay {
            self.current_delay_secs = self.current_delay_secs.min(max.as_secs_f64());
        }
        self.attempts += 1;

        Duration::try_from_secs_f64(clamped.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Final outcome of a [`RetryController::run`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ApiFailure>,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Sleeps taken between attempts, in order.
    pub delays: Vec<Duration>,
}

/// Drives a logical call through its attempts under a [`RetryPolicy`].
///
/// The attempt function receives the zero-based attempt index and must
/// build a fresh request each time: bodies are not reused across attempts.
#[derive(Clone, Debug)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<F, Fut, T>(&self, mut attempt: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiFailure>>,
    {
        let mut backoff = self.policy.backoff();
        let mut delays = Vec::new();
        let mut index = 0;

        loop {
            match attempt(index).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: index + 1,
                        delays,
                    };
                }
                Err(failure) if failure.is_retryable() && backoff.can_retry() => {
                    let delay = backoff.next_delay();
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        error = %failure,
                        attempt = index + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    delays.push(delay);
                    tokio::time::sleep(delay).await;
                    index += 1;
                }
                Err(failure) => {
                    return RetryOutcome {
                        result: Err(failure),
                        attempts: index + 1,
                        delays,
                    };
                }
            }
        }
    }
}

/// Retry a call with the default policy.
///
/// The default policy makes a single attempt, so this is mostly useful with
/// [`retry_with_policy`].
pub async fn retry<F, Fut, T>(f: F) -> Result<ApiResult<T>, ClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<ApiResult<T>, ClientError>>,
{
    retry_with_policy(&RetryPolicy::default(), f).await
}

/// Retry a whole API call, including any work done on its result.
///
/// Useful when the retry decision needs more than the response head, for
/// example re-running an NDJSON request whose stream was cut short. An
/// `Err(ClientError)` from `f` stops at once and is returned as is, as is an
/// invalid `policy`.
///
/// ```ignore
/// use socket_sdk_client::{RetryPolicy, retry_with_policy};
///
/// let policy = RetryPolicy::new().max_retries(3);
/// let quota = retry_with_policy(&policy, || client.get_quota()).await?;
/// ```
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    f: F,
) -> Result<ApiResult<T>, ClientError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<ApiResult<T>, ClientError>>,
{
    policy
        .validate()
        .map_err(|msg| ClientError::InvalidRequest(format!("invalid retry policy: {msg}")))?;

    let rejected = Mutex::new(None);
    let outcome = RetryController::new(policy.clone())
        .run(|_| {
            let call = f();
            let rejected = &rejected;
            async move {
                match call.await {
                    Ok(ApiResult::Ok { status, data }) => Ok::<(StatusCode, T), _>((status, data)),
                    Ok(ApiResult::Err(failure)) => Err(failure),
                    // Client failures are not retried, so this ends the run.
                    Err(e) => {
                        let failure = e.clone().into_failure(None);
                        if let Ok(mut slot) = rejected.lock() {
                            *slot = Some(e);
                        }
                        Err(failure)
                    }
                }
            }
        })
        .await;

    if let Some(e) = rejected.into_inner().ok().flatten() {
        return Err(e);
    }

    Ok(match outcome.result {
        Ok((status, data)) => ApiResult::ok(status, data),
        Err(failure) => ApiResult::err(failure),
    })
}
