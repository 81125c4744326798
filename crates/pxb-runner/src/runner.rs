use pxb_common::config::RunnerConfig;
use pxb_common::{CancellationToken, ExecutionMode, HarnessError, HarnessResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::report::{BatchReport, TaskReport};

/// Runs batches of independent tasks with a cap on in-flight tasks
///
/// Every admitted task runs to completion; a failure never cancels its
/// siblings. A cancelled token stops admission of further tasks, which are
/// then reported as `Cancelled`.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    max_concurrency: usize,
    task_timeout: Option<Duration>,
    mode: ExecutionMode,
}

impl TaskRunner {
    /// Create a parallel runner; a zero cap is raised to one
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            task_timeout: None,
            mode: ExecutionMode::Parallel,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.max_concurrency)
            .with_mode(config.mode)
            .with_task_timeout(config.task_timeout)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every task once; the report is in submission order
    #[instrument(skip_all, fields(tasks = tasks.len(), mode = ?self.mode))]
    pub async fn run<T, F, Fut>(
        &self,
        tasks: Vec<F>,
        cancel: Option<&CancellationToken>,
    ) -> BatchReport<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<T>> + Send + 'static,
    {
        let total = tasks.len();
        let concurrency = if self.mode == ExecutionMode::Sequential || total <= 1 {
            1
        } else {
            self.max_concurrency
        };
        info!("Running {} task(s) with concurrency {}", total, concurrency);

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut slots: Vec<Option<TaskReport<T>>> = (0..total).map(|_| None).collect();
        let mut handles: Vec<(usize, JoinHandle<(HarnessResult<T>, Duration)>)> =
            Vec::with_capacity(total);

        for (task_id, task) in tasks.into_iter().enumerate() {
            let Some(permit) = admit(&semaphore, cancel).await else {
                let reason = cancel.and_then(|token| token.reason()).unwrap_or_default();
                debug!("Task {} not admitted: {}", task_id, reason);
                slots[task_id] = Some(TaskReport {
                    task_id,
                    result: Err(HarnessError::Cancelled(format!(
                        "task {} not started: {}",
                        task_id, reason
                    ))),
                    elapsed: Duration::ZERO,
                });
                continue;
            };

            let timeout = self.task_timeout;
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let start = Instant::now();
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, task()).await {
                        Ok(result) => result,
                        Err(_) => Err(HarnessError::Timeout(limit, format!("task {}", task_id))),
                    },
                    None => task().await,
                };
                (result, start.elapsed())
            });
            handles.push((task_id, handle));
        }

        for (task_id, handle) in handles {
            let (result, elapsed) = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Task {} panicked: {}", task_id, e);
                    (
                        Err(HarnessError::TaskPanicked(format!("task {}: {}", task_id, e))),
                        Duration::ZERO,
                    )
                }
            };
            if let Err(e) = &result {
                warn!("Task {} failed after {:?}: {}", task_id, elapsed, e);
            }
            slots[task_id] = Some(TaskReport {
                task_id,
                result,
                elapsed,
            });
        }

        let reports: Vec<TaskReport<T>> = slots.into_iter().flatten().collect();
        let failed = reports.iter().filter(|r| !r.is_ok()).count();
        info!("Batch finished: {} succeeded, {} failed", total - failed, failed);
        BatchReport::new(reports)
    }

    /// Run `f` once per input, passing the input's index
    pub async fn run_each<I, T, F, Fut>(
        &self,
        inputs: Vec<I>,
        cancel: Option<&CancellationToken>,
        f: F,
    ) -> BatchReport<T>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(usize, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HarnessResult<T>> + Send + 'static,
    {
        let f = Arc::new(f);
        let tasks: Vec<_> = inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let f = f.clone();
                move || f(index, input)
            })
            .collect();
        self.run(tasks, cancel).await
    }
}

/// Wait for a permit, or `None` once the token is cancelled
async fn admit(
    semaphore: &Arc<Semaphore>,
    cancel: Option<&CancellationToken>,
) -> Option<OwnedSemaphorePermit> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            }
        }
        None => semaphore.clone().acquire_owned().await.ok(),
    }
}
