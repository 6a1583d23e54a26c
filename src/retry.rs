//! Retry logic with exponential backoff
//!
//! Remote calls answer with an envelope carrying a numeric `code`. Only the
//! codes listed in [`RetryConfig::retryable_codes`] (the rate-limit family by
//! default) schedule another attempt; transport errors and every other code
//! end the loop immediately, because the HTTP layer below has already had its
//! chance to retry.
//!
//! # Example
//!
//! ```no_run
//! use feishu_export::config::RetryConfig;
//! use feishu_export::retry::{RemoteStatus, with_retry};
//!
//! struct Reply(i64);
//!
//! impl RemoteStatus for Reply {
//!     fn code(&self) -> i64 { self.0 }
//!     fn msg(&self) -> &str { "" }
//!     fn request_id(&self) -> Option<&str> { None }
//! }
//!
//! # async fn example() -> feishu_export::Result<()> {
//! let config = RetryConfig::default();
//! let reply = with_retry(&config, |_attempt| async { Ok(Reply(0)) }).await?;
//! assert_eq!(reply.code(), 0);
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Access to the `{code, msg, request_id}` envelope of a remote response
pub trait RemoteStatus {
    /// Remote code; `0` (or absent) means success
    fn code(&self) -> i64;

    /// Remote message accompanying a non-zero code
    fn msg(&self) -> &str;

    /// Log id of the request, when the server returned one
    fn request_id(&self) -> Option<&str>;

    /// Turn a non-zero code into [`Error::Remote`] labelled with `operation`
    fn into_checked(self, operation: &str) -> Result<Self>
    where
        Self: Sized,
    {
        if self.code() == 0 {
            Ok(self)
        } else {
            Err(Error::remote(
                operation,
                self.code(),
                self.msg(),
                self.request_id().map(str::to_string),
            ))
        }
    }
}

/// Invoke `operation` until it succeeds, fails for good, or runs out of attempts
///
/// `operation` receives the 1-based attempt number. The last response is
/// returned as-is, including one carrying a non-zero code; callers decide
/// how to label it (see [`RemoteStatus::into_checked`] and [`call`]).
pub async fn with_retry<F, Fut, R>(config: &RetryConfig, mut operation: F) -> Result<R>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<R>>,
    R: RemoteStatus,
{
    let mut attempt = 1;
    let mut delay = config.initial_delay;

    loop {
        let response = match operation(attempt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, attempt, "Remote call failed without a response");
                return Err(e);
            }
        };

        let code = response.code();
        if code == 0 {
            if attempt > 1 {
                tracing::info!(attempts = attempt, "Remote call succeeded after retry");
            }
            return Ok(response);
        }

        if !config.is_retryable(code) {
            return Ok(response);
        }

        if attempt >= config.max_attempts {
            tracing::error!(
                code,
                msg = response.msg(),
                attempts = attempt,
                "Remote call still rate limited after all attempts"
            );
            return Ok(response);
        }

        let jittered_delay = add_jitter(delay, config.jitter);
        tracing::warn!(
            code,
            msg = response.msg(),
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = jittered_delay.as_millis(),
            "Remote call rate limited, retrying"
        );
        tokio::time::sleep(jittered_delay).await;

        let next_delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
        delay = next_delay.min(config.max_delay);
        attempt += 1;
    }
}

/// [`with_retry`] followed by [`RemoteStatus::into_checked`]
pub async fn call<F, Fut, R>(config: &RetryConfig, operation_label: &str, operation: F) -> Result<R>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<R>>,
    R: RemoteStatus,
{
    with_retry(config, operation).await?.into_checked(operation_label)
}

/// Randomize a delay by up to `factor` in either direction
///
/// With `factor = 0.2` the result lies in `[0.8 * delay, 1.2 * delay]`.
fn add_jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(-factor..=factor);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs.max(0.0))
}
