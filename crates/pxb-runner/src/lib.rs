//! Bounded-concurrency execution of independent tasks.
pub mod report;
pub mod runner;

pub use report::{BatchReport, TaskReport};
pub use runner::TaskRunner;
