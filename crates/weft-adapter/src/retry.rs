//! Bounded retry for transient external failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use weft_events::{ExecutionEvent, ExecutionNotifier};

use crate::error::AdapterError;

/// How often, and how far apart, a transient failure is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries allowed after the first call.
  pub max_attempts: u32,
  pub interval: Duration,
}

impl RetryPolicy {
  pub fn new(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      interval: Duration::from_secs(1),
    }
  }

  pub fn with_interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(3)
  }
}

/// Run `action`, retrying transient failures up to `policy.max_attempts`
/// times.
///
/// Each retry is reported to `notifier` and waits `policy.interval`. Once
/// retries run out the last failure is wrapped in
/// [`AdapterError::ExternalConnection`]. Non-transient failures are returned
/// untouched on first sight.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  notifier: &dyn ExecutionNotifier,
  mut action: F,
) -> Result<T, AdapterError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, AdapterError>>,
{
  let mut attempt: u32 = 0;

  loop {
    let err = match action().await {
      Ok(value) => return Ok(value),
      Err(err) if err.is_transient() => err,
      Err(err) => return Err(err),
    };

    if attempt >= policy.max_attempts {
      return Err(AdapterError::ExternalConnection {
        attempts: attempt,
        source: Box::new(err),
      });
    }

    warn!(
      attempt,
      max_attempts = policy.max_attempts,
      error = %err,
      "retrying external call"
    );
    notifier.notify(ExecutionEvent::RetryException {
      message: err.to_string(),
    });
    notifier.notify(ExecutionEvent::RetryOccurred {
      attempt,
      max: policy.max_attempts,
    });

    tokio::time::sleep(policy.interval).await;
    attempt += 1;
  }
}
