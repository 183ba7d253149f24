//! Retry logic with exponential backoff
//!
//! Failures are first classified ([`FailureClass`]), then a per-request
//! [`RetryState`] decides whether another attempt is allowed and how long to
//! wait. Authentication failures bypass the policy entirely; storage
//! exhaustion backs off more aggressively than ordinary server errors.
//!
//! # Example
//!
//! ```no_run
//! use deploy_mirror::config::RetryConfig;
//! use deploy_mirror::error::Error;
//! use deploy_mirror::retry::retry_with_backoff;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let bytes = retry_with_backoff(&config, &cancel, "src/a.txt", || async {
//!     Ok::<_, Error>(b"hello".to_vec())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// How a failure should be treated by the retry policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    /// Abort the whole run immediately (bad credentials, cancellation)
    Fatal,
    /// Server is throttling; expected under the concurrency cap
    Throttled,
    /// Server storage/resources exhausted; back off harder
    Exhausted,
    /// Network or server hiccup
    Transient,
    /// Retrying cannot help, but only this request is affected
    Permanent,
}

/// Trait for errors that can be classified for retry purposes
pub trait Classify {
    /// Classify this failure
    fn classify(&self) -> FailureClass;
}

impl Classify for Error {
    fn classify(&self) -> FailureClass {
        match self {
            Error::Authentication { .. } | Error::Cancelled => FailureClass::Fatal,
            Error::RateLimited { .. } => FailureClass::Throttled,
            Error::ResourceExhausted => FailureClass::Exhausted,
            Error::Server { .. } | Error::Network(_) => FailureClass::Transient,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::NotConnected
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::Interrupted => FailureClass::Transient,
                _ => FailureClass::Permanent,
            },
            Error::Decode(_)
            | Error::Serialization(_)
            | Error::Config { .. }
            | Error::EmptyTree { .. }
            | Error::NoReadyDeployment { .. } => FailureClass::Permanent,
            // Already terminal results of an earlier retry loop
            Error::DownloadFailed { .. } | Error::Incomplete { .. } => FailureClass::Permanent,
        }
    }
}

/// What to do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after waiting this long
    RetryAfter(Duration),
    /// Give up and surface the failure
    Stop,
}

/// Attempt counter and current backoff delay for one request
#[derive(Clone, Debug)]
pub struct RetryState {
    attempt: u32,
    current_delay: Duration,
}

impl RetryState {
    /// Fresh state: first attempt, delay at the configured base
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 1,
            current_delay: config.initial_delay,
        }
    }

    /// Number of the attempt in progress (1-based)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the next retry would use, before jitter
    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Decide after a failed attempt, advancing the state on retry
    pub fn next(&mut self, config: &RetryConfig, class: FailureClass) -> RetryDecision {
        let multiplier = match class {
            FailureClass::Fatal | FailureClass::Permanent => return RetryDecision::Stop,
            FailureClass::Exhausted => config.exhaustion_backoff_multiplier,
            FailureClass::Throttled | FailureClass::Transient => config.backoff_multiplier,
        };
        if self.attempt >= config.max_attempts {
            return RetryDecision::Stop;
        }

        let delay = self.current_delay.min(config.max_delay);
        let next = Duration::from_secs_f64(self.current_delay.as_secs_f64() * multiplier);
        self.current_delay = next.min(config.max_delay);
        self.attempt += 1;

        if config.jitter {
            RetryDecision::RetryAfter(add_jitter(delay))
        } else {
            RetryDecision::RetryAfter(delay)
        }
    }
}

/// Run `operation` until it succeeds, fails fatally, or runs out of attempts
///
/// Fatal failures are returned unchanged. Any other failure that stops the
/// loop is wrapped in [`Error::DownloadFailed`] naming `resource` and the
/// number of attempts made. Cancellation is observed while an attempt is in
/// flight and during backoff; the in-flight request future is dropped.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    resource: impl Into<PathBuf>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let resource = resource.into();
    let mut state = RetryState::new(config);

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = operation() => result,
        };

        let error = match outcome {
            Ok(value) => {
                if state.attempt() > 1 {
                    tracing::info!(
                        resource = %resource.display(),
                        attempts = state.attempt(),
                        "Request succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let class = error.classify();
        if class == FailureClass::Fatal {
            if matches!(error, Error::Cancelled) {
                tracing::debug!(resource = %resource.display(), "Cancelled, abandoning request");
            } else {
                tracing::error!(resource = %resource.display(), error = %error, "Fatal failure, not retrying");
            }
            return Err(error);
        }

        match state.next(config, class) {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    resource = %resource.display(),
                    error = %error,
                    attempt = state.attempt() - 1,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Request failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::Stop => {
                tracing::error!(
                    resource = %resource.display(),
                    error = %error,
                    attempts = state.attempt(),
                    "Request failed permanently"
                );
                return Err(Error::DownloadFailed {
                    path: resource,
                    attempts: state.attempt(),
                    source: Box::new(error),
                });
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
