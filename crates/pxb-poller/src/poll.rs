use pxb_common::{CancellationToken, HarnessError, HarnessResult, PollConfig};
use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

/// Verdict of one probe invocation
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The awaited condition holds
    Done(T),

    /// Not yet; the error, if any, describes the current mismatch
    Retry(Option<HarnessError>),

    /// The condition can never hold; stop polling
    Fatal(HarnessError),
}

/// Invoke `check` now and after every interval until it reports done, a
/// fatal error, or `config.timeout` elapses.
///
/// On timeout the most recent retry error is returned, or
/// `HarnessError::Timeout` if the probe never produced one. Sleeps are
/// clamped to the time remaining, so the call returns within
/// `timeout + interval` plus the duration of the last probe.
#[instrument(skip(config, cancel, check), fields(timeout = ?config.timeout, interval = ?config.interval))]
pub async fn poll_until<T, F, Fut>(
    what: &str,
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    mut check: F,
) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollOutcome<T>>,
{
    let start = Instant::now();
    let mut interval = config.interval;
    let mut last_error: Option<HarnessError> = None;
    let mut attempt: u32 = 0;

    loop {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(cancelled(what, token));
            }
        }

        attempt += 1;
        match check().await {
            PollOutcome::Done(value) => {
                debug!("{} satisfied after {} attempt(s)", what, attempt);
                return Ok(value);
            }
            PollOutcome::Fatal(error) => {
                warn!("Giving up on {} after {} attempt(s): {}", what, attempt, error);
                return Err(error);
            }
            PollOutcome::Retry(Some(error)) => {
                debug!("Attempt {} for {}: {}", attempt, what, error);
                last_error = Some(error);
            }
            PollOutcome::Retry(None) => {}
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            warn!("Timed out waiting for {} after {} attempt(s)", what, attempt);
            return Err(last_error
                .unwrap_or_else(|| HarnessError::Timeout(config.timeout, what.to_string())));
        }

        let pause = interval.min(config.timeout - elapsed);
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = sleep(pause) => {}
                    _ = token.cancelled() => return Err(cancelled(what, token)),
                }
            }
            None => sleep(pause).await,
        }
        interval = config.next_interval(interval);
    }
}

fn cancelled(what: &str, token: &CancellationToken) -> HarnessError {
    HarnessError::Cancelled(format!(
        "stopped waiting for {}: {}",
        what,
        token.reason().unwrap_or_default()
    ))
}
