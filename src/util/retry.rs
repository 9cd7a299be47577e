//! Fixed-backoff retry for transient failures such as lazy module loads or producer calls.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::platform::runtime::sleep;
use crate::util::abort::AbortSignal;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub signal: Option<AbortSignal>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            signal: None,
        }
    }
}

impl RetryConfig {
    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

/// Last failure after every attempt was used up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub source: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.source)
    }
}

impl<E> std::error::Error for RetryError<E> where E: std::error::Error + 'static {}

/// Runs `operation` until it succeeds or `max_retries` attempts have failed, sleeping
/// `retry_delay` between attempts.
///
/// Resolves to `Ok(None)` when the signal is aborted before or between attempts; an
/// aborted retry is not a failure.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<Option<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_retries = config.max_retries.max(1);
    let mut attempt = 0;
    loop {
        if config.is_aborted() {
            return Ok(None);
        }
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(Some(value)),
            Err(source) if attempt >= max_retries => {
                return Err(RetryError {
                    attempts: attempt,
                    source,
                })
            }
            Err(_) => sleep(config.retry_delay).await,
        }
    }
}
