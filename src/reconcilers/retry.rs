// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff.
//!
//! Two retry loops live here:
//!
//! - [`retry_api_call`] retries transient Kubernetes API errors (429, 5xx)
//!   and fails fast on permanent errors.
//! - [`write_verify_settle`] drives a write against an eventually consistent
//!   remote store, reads it back, classifies what it sees and rewrites until
//!   the store is consistent or the attempt budget runs out.

use anyhow::Result;
use rand::Rng;
use reqwest::StatusCode;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::constants::{
    VERIFY_BACKOFF_MULTIPLIER, VERIFY_INITIAL_BACKOFF_MILLIS, VERIFY_MAX_ATTEMPTS,
    VERIFY_MAX_BACKOFF_SECS, VERIFY_SETTLE_DELAY_MILLIS,
};

/// Maximum total time to spend retrying (5 minutes)
const MAX_ELAPSED_TIME_SECS: u64 = 300;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (30 seconds)
const MAX_INTERVAL_SECS: u64 = 30;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    start_time: Instant,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let jittered = rand::rng().random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create default exponential backoff configuration for Kubernetes API retries.
///
/// # Configuration
///
/// - **Initial interval**: 100ms
/// - **Max interval**: 30 seconds
/// - **Max elapsed time**: 5 minutes total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **429** (Too Many Requests) - Rate limiting
/// - **500** (Internal Server Error) - Server error
/// - **502** (Bad Gateway) - Proxy/gateway error
/// - **503** (Service Unavailable) - Temporary unavailability
/// - **504** (Gateway Timeout) - Gateway timeout
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Retry a Kubernetes API call with exponential backoff.
///
/// Automatically retries on transient errors (HTTP 429, 5xx) and fails immediately
/// on permanent errors (4xx client errors except 429).
///
/// # Errors
///
/// Returns error if:
/// - Non-retryable error encountered (4xx client error)
/// - Max elapsed time exceeded (5 minutes)
/// - All retries exhausted
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client};
/// use k8s_openapi::api::core::v1::Service;
/// use tunnelsync::reconcilers::retry::retry_api_call;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<Service> = Api::namespaced(client, "default");
///
/// let service = retry_api_call(
///     || async { api.get_opt("web").await },
///     "get service default/web"
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable Kubernetes API error, failing immediately"
                    );
                    return Err(e.into());
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(anyhow::anyhow!(
                        "Backoff exhausted after {attempt} attempts: {e}"
                    ));
                }
            }
        }
    }
}

/// Determine if a Kubernetes error is retryable.
///
/// Rate limiting (429), server errors (5xx) and transport failures are
/// retryable. Every other error is permanent.
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => true,
        _ => false,
    }
}

// ============================================================================
// Write / verify / settle
// ============================================================================

/// Budget and timing of a write-verify-settle run.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteVerifyPolicy {
    /// Total write cycles allowed, including the first one.
    pub max_attempts: u32,
    /// Pause before the second cycle.
    pub initial_backoff: Duration,
    /// Growth factor of the pause between cycles.
    pub backoff_multiplier: f64,
    /// Upper bound on the pause between cycles.
    pub max_backoff: Duration,
    /// Pause between a clean read-back and the confirming read.
    pub settle_delay: Duration,
}

impl Default for WriteVerifyPolicy {
    fn default() -> Self {
        Self {
            max_attempts: VERIFY_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(VERIFY_INITIAL_BACKOFF_MILLIS),
            backoff_multiplier: VERIFY_BACKOFF_MULTIPLIER,
            max_backoff: Duration::from_secs(VERIFY_MAX_BACKOFF_SECS),
            settle_delay: Duration::from_millis(VERIFY_SETTLE_DELAY_MILLIS),
        }
    }
}

impl WriteVerifyPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.initial_backoff,
            self.max_backoff,
            None,
            self.backoff_multiplier,
            0.0,
        )
    }
}

/// What a read-back shows relative to what was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consistency {
    /// Every expected entry is present and correct.
    Consistent,
    /// Entries are missing or differ, but nothing unsafe is published.
    Drifted,
    /// Something that must never be published is visible.
    Leaked,
}

/// Which read-back is being checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStage {
    /// Read immediately after the write.
    Immediate,
    /// Read after the settle delay of a clean immediate read-back.
    Settled,
}

/// Terminal failure of a write-verify-settle run.
#[derive(Debug)]
pub enum WriteVerifyError<E> {
    /// The write failed and was either permanent or the budget ran out.
    Write { attempts: u32, source: E },
    /// The immediate read-back failed on every remaining attempt.
    ReadBack { attempts: u32, source: E },
    /// The last read-back still showed leaked entries.
    Leaked { attempts: u32 },
}

/// Successful end of a write-verify-settle run.
#[derive(Debug)]
pub struct WriteVerifyOutcome<P> {
    /// What the final write intended.
    pub plan: P,
    /// Number of write cycles used.
    pub attempts: u32,
    /// True when the budget ran out with only drift left and the result was accepted.
    pub drift_accepted: bool,
}

enum LastFailure<P, E> {
    Write(E),
    ReadBack(E),
    Leaked,
    Drifted(P),
}

/// Write, read back, classify and retry until the remote store is consistent.
///
/// Each cycle calls `write` (which should re-read and re-merge so it never
/// overwrites concurrent changes with stale data), then `read_back`, then
/// `check`. A [`Consistency::Consistent`] immediate read-back is confirmed by
/// a second read after `settle_delay`. If that confirming read fails, the
/// previous clean read-back stands.
///
/// When the budget runs out:
/// - a write failure becomes [`WriteVerifyError::Write`]
/// - a read-back failure becomes [`WriteVerifyError::ReadBack`]
/// - leaked entries become [`WriteVerifyError::Leaked`]
/// - drift alone is accepted with `drift_accepted = true`
///
/// Write failures for which `is_retryable` returns false end the run at once.
///
/// # Errors
///
/// See above.
pub async fn write_verify_settle<P, T, E, W, WFut, R, RFut, C, Retry>(
    policy: &WriteVerifyPolicy,
    mut write: W,
    mut read_back: R,
    mut check: C,
    is_retryable: Retry,
) -> Result<WriteVerifyOutcome<P>, WriteVerifyError<E>>
where
    W: FnMut(u32) -> WFut,
    WFut: Future<Output = Result<P, E>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = Result<T, E>>,
    C: FnMut(&P, &T, VerificationStage) -> Consistency,
    Retry: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let last = 'cycle: {
            let plan = match write(attempt).await {
                Ok(plan) => plan,
                Err(e) if !is_retryable(&e) => {
                    error!(attempt, error = %e, "Non-retryable write failure, giving up");
                    return Err(WriteVerifyError::Write {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Write failed");
                    break 'cycle LastFailure::Write(e);
                }
            };

            let observed = match read_back().await {
                Ok(observed) => observed,
                Err(e) => {
                    warn!(attempt, error = %e, "Read-back failed");
                    break 'cycle LastFailure::ReadBack(e);
                }
            };

            match check(&plan, &observed, VerificationStage::Immediate) {
                Consistency::Leaked => break 'cycle LastFailure::Leaked,
                Consistency::Drifted => break 'cycle LastFailure::Drifted(plan),
                Consistency::Consistent => {}
            }

            debug!(attempt, settle_delay = ?policy.settle_delay, "Read-back clean, waiting to confirm");
            tokio::time::sleep(policy.settle_delay).await;

            let settled = match read_back().await {
                Ok(settled) => settled,
                Err(e) => {
                    warn!(attempt, error = %e, "Confirming read-back failed, keeping clean result");
                    return Ok(WriteVerifyOutcome {
                        plan,
                        attempts: attempt,
                        drift_accepted: false,
                    });
                }
            };

            match check(&plan, &settled, VerificationStage::Settled) {
                Consistency::Leaked => LastFailure::Leaked,
                Consistency::Drifted => LastFailure::Drifted(plan),
                Consistency::Consistent => {
                    return Ok(WriteVerifyOutcome {
                        plan,
                        attempts: attempt,
                        drift_accepted: false,
                    });
                }
            }
        };

        if attempt >= max_attempts {
            return match last {
                LastFailure::Write(source) => Err(WriteVerifyError::Write {
                    attempts: attempt,
                    source,
                }),
                LastFailure::ReadBack(source) => Err(WriteVerifyError::ReadBack {
                    attempts: attempt,
                    source,
                }),
                LastFailure::Leaked => Err(WriteVerifyError::Leaked { attempts: attempt }),
                LastFailure::Drifted(plan) => {
                    warn!(
                        attempts = attempt,
                        "Remote state still differs after all attempts, accepting"
                    );
                    Ok(WriteVerifyOutcome {
                        plan,
                        attempts: attempt,
                        drift_accepted: true,
                    })
                }
            };
        }

        let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
        debug!(attempt, retry_after = ?delay, "Retrying write cycle");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
