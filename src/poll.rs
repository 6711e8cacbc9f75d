//! Bounded polling helpers
//!
//! Every wait on the vehicle goes through [poll_until()] so that it has an
//! explicit deadline and can be cancelled.

use crate::config::RetryPolicy;
use crate::state::CancelToken;
use crate::{Error, Result};
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Call `check` every `interval` until it returns `Some`.
///
/// `check` is called at least once. Returns [Error::Timeout] naming `what`
/// once `timeout` has elapsed, [Error::Cancelled] if `cancel` fires, and the
/// first error returned by `check`.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    interval: Duration,
    timeout: Duration,
    cancel: &CancelToken,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(value) = check().await? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(what.to_owned()));
        }
        sleep_or_cancel(interval, cancel).await?;
    }
}

/// Sleep for `duration` unless `cancel` fires first
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancelToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(duration) => Ok(()),
    }
}

/// Run `read`, retrying with exponential backoff while it fails with
/// [Error::TelemetryTimeout]. Other errors are returned immediately.
pub async fn retry_telemetry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut read: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;

    loop {
        match read().await {
            Err(Error::TelemetryTimeout) if retries < policy.max_retries => {
                let backoff = policy.backoff(retries);
                retries += 1;
                debug!("Telemetry gap, retry {} in {:?}", retries, backoff);
                sleep_or_cancel(backoff, cancel).await?;
            }
            result => return result,
        }
    }
}
