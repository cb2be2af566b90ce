use std::ops::ControlFlow;
use std::time::Duration;

use rand::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

/// Exponential backoff with jitter
///
/// See <https://aws.amazon.com/blogs/architecture/exponential-backoff-and-jitter/>
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_copy_implementations)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: f64,

    /// Give up once the accumulated backoff exceeds this.
    pub deadline: Option<Duration>,

    /// Give up after this many failed attempts.
    pub max_attempts: Option<usize>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            base: 3.,
            deadline: None,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Error)]
#[allow(missing_copy_implementations)]
pub enum BackoffError {
    #[error("Retry exceeded deadline: {source}")]
    DeadlineExceeded {
        deadline: Duration,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Retry gave up after {attempts} attempts: {source}")]
    AttemptsExhausted {
        attempts: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type BackoffResult<T> = Result<T, BackoffError>;

/// Error (which should increase backoff) or throttle for a specific duration (as asked for by the broker).
#[derive(Debug)]
pub enum ErrorOrThrottle<E>
where
    E: Send,
{
    Error(E),
    Throttle(Duration),
}

impl<E> From<E> for ErrorOrThrottle<E>
where
    E: Send,
{
    fn from(e: E) -> Self {
        Self::Error(e)
    }
}

/// [`Backoff`] can be created from a [`BackoffConfig`]
///
/// Consecutive calls to [`Backoff::next`] will return the next backoff interval
///
pub struct Backoff {
    init_backoff: f64,
    next_backoff_secs: f64,
    max_backoff_secs: f64,
    base: f64,
    total: f64,
    deadline: Option<f64>,
    attempts: usize,
    max_attempts: Option<usize>,
    rng: Option<Box<dyn RngCore + Sync + Send>>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("init_backoff", &self.init_backoff)
            .field("next_backoff_secs", &self.next_backoff_secs)
            .field("max_backoff_secs", &self.max_backoff_secs)
            .field("base", &self.base)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl Backoff {
    /// Create a new [`Backoff`] from the provided [`BackoffConfig`]
    pub fn new(config: &BackoffConfig) -> Self {
        Self::new_with_rng(config, None)
    }

    /// Creates a new `Backoff` with the optional `rng`
    ///
    /// Used [`rand::thread_rng()`] if no rng provided
    pub fn new_with_rng(
        config: &BackoffConfig,
        rng: Option<Box<dyn RngCore + Sync + Send>>,
    ) -> Self {
        let init_backoff = config.init_backoff.as_secs_f64();
        Self {
            init_backoff,
            next_backoff_secs: init_backoff,
            max_backoff_secs: config.max_backoff.as_secs_f64(),
            base: config.base,
            total: 0.0,
            deadline: config.deadline.map(|d| d.as_secs_f64()),
            attempts: 0,
            max_attempts: config.max_attempts,
            rng,
        }
    }

    /// Perform an async operation that retries with a backoff
    pub async fn retry_with_backoff<F, F1, B, E>(
        &mut self,
        request_name: &str,
        do_stuff: F,
    ) -> BackoffResult<B>
    where
        F: (Fn() -> F1) + Send + Sync,
        F1: std::future::Future<Output = ControlFlow<B, ErrorOrThrottle<E>>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        loop {
            // split match statement from `tokio::time::sleep`, because otherwise rustc requires `B: Send`
            let sleep_time = match do_stuff().await {
                ControlFlow::Break(r) => break Ok(r),
                ControlFlow::Continue(ErrorOrThrottle::Error(e)) => {
                    self.attempts += 1;
                    if let Some(max_attempts) = self.max_attempts {
                        if self.attempts >= max_attempts {
                            warn!(
                                e=%e,
                                request_name,
                                attempts = self.attempts,
                                "request failed too many times - giving up",
                            );
                            return Err(BackoffError::AttemptsExhausted {
                                attempts: self.attempts,
                                source: Box::new(e),
                            });
                        }
                    }

                    let backoff = match self.next() {
                        Some(backoff) => backoff,
                        None => {
                            return Err(BackoffError::DeadlineExceeded {
                                deadline: Duration::from_secs_f64(self.deadline.unwrap_or_default()),
                                source: Box::new(e),
                            });
                        }
                    };

                    info!(
                        e=%e,
                        request_name,
                        backoff_secs = backoff.as_secs_f64(),
                        "request encountered non-fatal error - backing off",
                    );
                    backoff
                }
                ControlFlow::Continue(ErrorOrThrottle::Throttle(throttle)) => {
                    info!(?throttle, request_name, "broker asked us to throttle",);
                    throttle
                }
            };

            tokio::time::sleep(sleep_time).await;
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    /// Returns the next backoff duration to wait for, if any
    fn next(&mut self) -> Option<Self::Item> {
        let range = self.init_backoff..(self.next_backoff_secs * self.base);

        let rand_backoff = match self.rng.as_mut() {
            Some(rng) => rng.gen_range(range),
            None => thread_rng().gen_range(range),
        };

        let next_backoff = self.max_backoff_secs.min(rand_backoff);
        self.total += next_backoff;
        let res = std::mem::replace(&mut self.next_backoff_secs, next_backoff);
        if let Some(deadline) = self.deadline {
            if self.total >= deadline {
                return None;
            }
        }
        Some(Duration::from_secs_f64(res))
    }
}
