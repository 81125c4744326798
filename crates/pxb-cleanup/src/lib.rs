/// Best-effort, dependency-ordered teardown of a test case's entities
pub mod order;
pub mod report;
pub mod sequencer;

pub use order::{teardown_order, teardown_order_with};
pub use report::{CleanupFailure, CleanupReport};
pub use sequencer::CleanupSequencer;
