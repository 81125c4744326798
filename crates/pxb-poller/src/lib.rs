//! Retry-until-condition polling for asynchronous control plane state.
pub mod poll;
pub mod probes;

pub use poll::{poll_until, PollOutcome};
pub use probes::{retry_with_timeout, wait_for_absence, wait_for_status};
