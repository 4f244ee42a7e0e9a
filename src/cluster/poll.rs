//! # Poll Until
//!
//! Bounded polling shared by every waiter. Each iteration checks
//! cancellation, then the predicate, then the budget, then sleeps for the
//! interval while racing cancellation. The predicate always runs at least
//! once, even with a zero budget.

use crate::observability::metrics;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Budget and cadence of one poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
    /// Metrics label for the waiter driving this loop
    pub waiter: &'static str,
}

impl PollSettings {
    pub fn new(waiter: &'static str, timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            waiter,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("condition not met within {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Poll `check` until it returns `Ok(true)`.
///
/// `Ok(false)` keeps polling. `Err` is logged and polling continues, so a
/// transient API failure only costs one interval of the budget.
pub async fn poll_until<F, Fut, E>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let start = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        metrics::increment_poll_iterations(settings.waiter);
        match check().await {
            Ok(true) => return Ok(()),
            Ok(false) => trace!(waiter = settings.waiter, "Condition not met yet"),
            Err(e) => debug!(waiter = settings.waiter, "Poll check failed (retrying): {}", e),
        }

        if start.elapsed() > settings.timeout {
            return Err(PollError::TimedOut(settings.timeout));
        }

        tokio::select! {
            () = tokio::time::sleep(settings.interval) => {}
            () = cancel.cancelled() => return Err(PollError::Cancelled),
        }
    }
}
