use pxb_common::{HarnessError, HarnessResult};
use std::time::Duration;

/// Outcome of one task in a batch
#[derive(Debug)]
pub struct TaskReport<T> {
    /// Index of the task in the submitted batch
    pub task_id: usize,

    pub result: HarnessResult<T>,

    /// Time spent executing; zero for tasks never admitted
    pub elapsed: Duration,
}

impl<T> TaskReport<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&HarnessError> {
        self.result.as_ref().err()
    }
}

/// Per-task outcomes of a batch, in submission order
#[derive(Debug)]
pub struct BatchReport<T> {
    reports: Vec<TaskReport<T>>,
}

impl<T> BatchReport<T> {
    pub(crate) fn new(reports: Vec<TaskReport<T>>) -> Self {
        Self { reports }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// True iff no task carries an error
    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(TaskReport::is_ok)
    }

    pub fn failures(&self) -> Vec<&TaskReport<T>> {
        self.reports.iter().filter(|r| !r.is_ok()).collect()
    }

    pub fn successes(&self) -> impl Iterator<Item = &T> {
        self.reports.iter().filter_map(|r| r.result.as_ref().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskReport<T>> {
        self.reports.iter()
    }

    pub fn into_reports(self) -> Vec<TaskReport<T>> {
        self.reports
    }

    /// All values in submission order, or a `BatchFailed` naming the first error
    pub fn into_result(self) -> HarnessResult<Vec<T>> {
        let total = self.reports.len();
        let failed = self.reports.iter().filter(|r| !r.is_ok()).count();

        if failed == 0 {
            return self.reports.into_iter().map(|r| r.result).collect();
        }

        let first = self
            .reports
            .into_iter()
            .find_map(|r| r.result.err())
            .map(|e| e.to_string())
            .unwrap_or_default();
        Err(HarnessError::BatchFailed {
            failed,
            total,
            first,
        })
    }
}
