//! Bounded job scheduler for leaf downloads.
//!
//! At most `limit` jobs run at once. [`JobScheduler::submit`] waits for a free
//! slot when the limit is reached, which is the only backpressure applied to
//! the traversal. [`JobScheduler::drain`] closes the scheduler and waits for
//! every submitted job before returning.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::{AppError, Result};

/// Summary of the jobs observed by a scheduler.
#[derive(Debug, Default)]
pub struct JobReport {
    /// Jobs that finished successfully
    pub completed: usize,
    /// Errors of failed jobs not yet collected with `take_failure`
    pub failures: Vec<AppError>,
}

/// Concurrency-limited job runner on the tokio runtime.
#[derive(Debug)]
pub struct JobScheduler {
    limit: usize,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<Result<()>>>,
    failures: Mutex<VecDeque<AppError>>,
    completed: AtomicUsize,
    closed: AtomicBool,
}

impl JobScheduler {
    /// Create a scheduler running at most `limit` jobs concurrently.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            tasks: Mutex::new(JoinSet::new()),
            failures: Mutex::new(VecDeque::new()),
            completed: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Submit a job, waiting for a free slot if the limit is reached.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(AppError::SchedulerClosed);
        }

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::SchedulerClosed)?;

        let mut tasks = self.lock_tasks();
        self.reap(&mut tasks);
        tasks.spawn(async move {
            let _permit = permit;
            job.await
        });
        Ok(())
    }

    /// Take the oldest failure among jobs that have finished so far.
    pub fn take_failure(&self) -> Option<AppError> {
        {
            let mut tasks = self.lock_tasks();
            self.reap(&mut tasks);
        }
        self.lock_failures().pop_front()
    }

    /// Refuse further submissions and wait for all submitted jobs.
    pub async fn drain(&self) -> JobReport {
        self.closed.store(true, Ordering::Release);
        self.permits.close();

        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        log::debug!("Draining {} outstanding jobs", tasks.len());
        while let Some(result) = tasks.join_next().await {
            self.record(result);
        }

        JobReport {
            completed: self.completed.load(Ordering::Acquire),
            failures: self.lock_failures().drain(..).collect(),
        }
    }

    fn reap(&self, tasks: &mut JoinSet<Result<()>>) {
        while let Some(result) = tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&self, result: std::result::Result<Result<()>, JoinError>) {
        match result {
            Ok(Ok(())) => {
                self.completed.fetch_add(1, Ordering::AcqRel);
            }
            Ok(Err(e)) => {
                log::error!("Job failed: {e}");
                self.lock_failures().push_back(e);
            }
            Err(e) => {
                log::error!("Job aborted: {e}");
                self.lock_failures().push_back(AppError::Job(e.to_string()));
            }
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<Result<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failures(&self) -> MutexGuard<'_, VecDeque<AppError>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
