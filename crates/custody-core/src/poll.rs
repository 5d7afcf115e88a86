//! Bounded polling of remote state.
//!
//! Both orchestrators wait on the custody service the same way: fetch, test
//! for a terminal state, sleep, repeat until the deadline. Reaching the
//! deadline is not an error here; the last observed value is returned and the
//! caller decides what a timeout means for its operation.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Deadline and spacing of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Total time budget measured from the first fetch.
    pub timeout: Duration,
    /// Pause between consecutive fetches.
    pub interval: Duration,
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(interval_ms),
        )
    }
}

/// Poll `fetch` until `is_terminal` accepts a value or the deadline passes.
///
/// - Returns the first terminal value.
/// - On deadline, returns the most recent non-terminal value.
/// - Transient fetch errors (see [`Error::is_transient`]) are logged and
///   retried; any other error is returned at once.
/// - If no fetch succeeded before the deadline, the last error is returned.
///
/// `fetch` is always called at least once and never after the deadline, so a
/// zero timeout yields exactly the first result.
pub async fn poll<T, F, Fut, P>(options: PollOptions, mut fetch: F, is_terminal: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let deadline = Instant::now() + options.timeout;
    let mut last_value: Option<T> = None;
    let mut last_error: Option<Error> = None;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match fetch().await {
            Ok(value) if is_terminal(&value) => {
                debug!(attempt, "Poll reached terminal state");
                return Ok(value);
            }
            Ok(value) => {
                debug!(attempt, "Poll observed non-terminal state");
                last_value = Some(value);
            }
            Err(e) if e.is_transient() => {
                warn!(attempt, error = %e, "Transient failure while polling, will retry");
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(options.interval.min(deadline - now)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    match last_value {
        Some(value) => {
            warn!(
                attempts = attempt,
                timeout_ms = options.timeout.as_millis() as u64,
                "Poll deadline elapsed before a terminal state"
            );
            Ok(value)
        }
        None => Err(last_error
            .unwrap_or_else(|| Error::protocol("poll finished without any fetch result"))),
    }
}
