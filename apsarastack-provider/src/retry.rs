//! Retrying operations and waiting for instance status

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use crate::connectivity::{Result, SdkError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_LONG_TIMEOUT: Duration = Duration::from_secs(1000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Instance status reached once the resource is gone
pub const DELETED: &str = "Deleted";
pub const RUNNING: &str = "Running";

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum RetryError {
    Retryable(SdkError),
    NonRetryable(SdkError),
}

impl RetryError {
    pub fn retryable(err: SdkError) -> Self {
        RetryError::Retryable(err)
    }

    pub fn non_retryable(err: SdkError) -> Self {
        RetryError::NonRetryable(err)
    }
}

/// Run `op` until it succeeds, fails for good, or `timeout` elapses.
///
/// The pause between attempts starts at 500ms and doubles up to 10s.
pub async fn retry<T, F, Fut>(timeout: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(RetryError::NonRetryable(err)) => return Err(err),
            Err(RetryError::Retryable(err)) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(SdkError::Timeout(Box::new(err)));
                }
                debug!("retrying after error: {}", err);
                tokio::time::sleep(backoff.min(deadline - now)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Poll `describe` until it reports `target`.
///
/// For the `Deleted` target a not-found error counts as reached. Any other
/// error ends the wait.
pub async fn wait_for_status<F, Fut>(
    id: &str,
    target: &str,
    timeout: Duration,
    interval: Duration,
    mut describe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let deadline = Instant::now() + timeout;

    loop {
        let status = match describe().await {
            Ok(status) => status,
            Err(e) if target == DELETED && e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if status == target {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(SdkError::WaitTimeout {
                id: id.to_string(),
                target: target.to_string(),
                last: status,
            });
        }
        debug!("{} is {}, waiting for {}", id, status, target);
        tokio::time::sleep(interval).await;
    }
}
