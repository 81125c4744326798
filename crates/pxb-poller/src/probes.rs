use pxb_common::{CancellationToken, EntityStatus, HarnessError, HarnessResult, PollConfig};
use std::future::Future;

use crate::poll::{poll_until, PollOutcome};

/// Wait until `probe` reports one of `expected`.
///
/// A status in `unexpected` aborts with `UnexpectedStatus`. Probe errors are
/// retried unless they are fatal.
pub async fn wait_for_status<F, Fut>(
    what: &str,
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    expected: &[EntityStatus],
    unexpected: &[EntityStatus],
    mut probe: F,
) -> HarnessResult<EntityStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<EntityStatus>>,
{
    poll_until(what, config, cancel, || {
        let status = probe();
        async move {
            match status.await {
                Ok(actual) if expected.contains(&actual) => PollOutcome::Done(actual),
                Ok(actual) if unexpected.contains(&actual) => {
                    PollOutcome::Fatal(HarnessError::UnexpectedStatus {
                        name: what.to_string(),
                        expected: join(expected),
                        actual: actual.to_string(),
                    })
                }
                Ok(actual) => PollOutcome::Retry(Some(HarnessError::ConditionNotMet(format!(
                    "{} is {}, waiting for [{}]",
                    what,
                    actual,
                    join(expected)
                )))),
                Err(e) if e.is_fatal() => PollOutcome::Fatal(e),
                Err(e) => PollOutcome::Retry(Some(e)),
            }
        }
    })
    .await
}

/// Wait until `probe` reports the entity is no longer present.
///
/// A `NotFound` from the probe counts as absent.
pub async fn wait_for_absence<F, Fut>(
    what: &str,
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    mut probe: F,
) -> HarnessResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<bool>>,
{
    poll_until(what, config, cancel, || {
        let present = probe();
        async move {
            match present.await {
                Ok(false) => PollOutcome::Done(()),
                Ok(true) => PollOutcome::Retry(Some(HarnessError::ConditionNotMet(format!(
                    "{} is not deleted yet",
                    what
                )))),
                Err(e) if e.is_not_found() => PollOutcome::Done(()),
                Err(e) if e.is_fatal() => PollOutcome::Fatal(e),
                Err(e) => PollOutcome::Retry(Some(e)),
            }
        }
    })
    .await
}

/// Re-run `op` until it succeeds or fails with an error `should_retry` rejects
pub async fn retry_with_timeout<T, F, Fut, R>(
    what: &str,
    config: &PollConfig,
    cancel: Option<&CancellationToken>,
    mut op: F,
    should_retry: R,
) -> HarnessResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<T>>,
    R: Fn(&HarnessError) -> bool,
{
    let should_retry = &should_retry;
    poll_until(what, config, cancel, || {
        let attempt = op();
        async move {
            match attempt.await {
                Ok(value) => PollOutcome::Done(value),
                Err(e) if should_retry(&e) => PollOutcome::Retry(Some(e)),
                Err(e) => PollOutcome::Fatal(e),
            }
        }
    })
    .await
}

fn join(statuses: &[EntityStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
