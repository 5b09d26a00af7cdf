//! Bounded, cancellable retry on transient failures.
//!
//! A [`RetryPolicy`] is a fixed schedule of delays. The initial attempt runs
//! immediately; each retry waits for the next delay in the schedule. Only
//! failures accepted by the classifier are retried; anything else is returned
//! at once. Every wait races the cancellation token, so shutdown never waits
//! out the schedule.

use core::future::Future;
use std::time::Duration;

use error_stack::Report;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::CommError;
use crate::error::CommResult;

/// Fixed-delay retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Maximum number of calls, initial attempt included.
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Retry `op` on failures classified as transient by [`CommError::is_transient`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, op: F) -> CommResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CommResult<T>>,
    {
        self.run_with(cancel, CommError::is_transient, op).await
    }

    /// Retry `op` on failures accepted by `is_retryable`.
    ///
    /// # Errors
    ///
    /// - the first non-retryable error, unchanged
    /// - [`CommError::ConnectionFailed`] once the schedule is exhausted
    /// - [`CommError::Cancelled`] if `cancel` fires before or between attempts
    pub async fn run_with<T, F, Fut, C>(
        &self,
        cancel: &CancellationToken,
        is_retryable: C,
        mut op: F,
    ) -> CommResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CommResult<T>>,
        C: Fn(&CommError) -> bool,
    {
        if cancel.is_cancelled() {
            return Err(Report::new(CommError::Cancelled));
        }

        let mut last_error = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_retryable(err.current_context()) => err,
            Err(err) => return Err(err),
        };

        for (retry, delay) in self.delays.iter().enumerate() {
            debug!(
                retry = retry + 1,
                delay_sec = delay.as_secs_f32(),
                error = %last_error,
                "Transient delivery failure, retrying after delay"
            );

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(last_error.change_context(CommError::Cancelled));
                }
                () = tokio::time::sleep(*delay) => {}
            }

            last_error = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(err.current_context()) => err,
                Err(err) => return Err(err),
            };
        }

        warn!(attempts = self.max_attempts(), error = %last_error, "Retry schedule exhausted");
        Err(last_error.change_context(CommError::ConnectionFailed {
            attempts: self.max_attempts(),
        }))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        ])
    }
}
