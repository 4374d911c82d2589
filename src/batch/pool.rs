//! Fixed-size worker pool with a shared job queue.
//!
//! Workers pull jobs from a mutex-guarded queue until it is empty or the
//! [`CancelToken`] fires. Every finished job is sent to the calling thread as
//! a completion event, so the caller's callback never runs on a worker. The
//! completed-count is incremented and the event sent under the same lock,
//! which keeps the counts seen by the callback strictly increasing.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{MeshError, Result};

/// Cooperative cancellation flag shared between a caller and a running pool.
///
/// Cancelling stops workers from taking new jobs; jobs already running are
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What became of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult<R> {
    /// The job ran to completion.
    Finished(R),
    /// The job panicked; the payload message is kept.
    Panicked(String),
    /// The job was never started because the run was cancelled.
    Skipped,
}

/// Event delivered to the caller after each job.
#[derive(Debug)]
pub struct Completion<'a, R> {
    /// Position of the job in the input.
    pub index: usize,
    /// Jobs finished so far, including this one.
    pub completed: usize,
    /// Total number of jobs submitted.
    pub total: usize,
    /// The job's result.
    pub result: &'a JobResult<R>,
}

/// A pool of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    /// Create a pool, defaulting to the available parallelism.
    ///
    /// # Errors
    ///
    /// [`MeshError::InvalidParameter`] for zero threads.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let threads = match threads {
            Some(0) => {
                return Err(MeshError::invalid_param("threads", 0, "must be at least 1"));
            }
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };
        Ok(Self { threads })
    }

    /// Number of worker threads.
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `work` on every job.
    ///
    /// `on_complete` is called on the calling thread once per finished job, in
    /// completion order. The returned vector is in input order; jobs left in
    /// the queue after cancellation are [`JobResult::Skipped`].
    pub fn run<T, R, F, C>(
        &self,
        jobs: Vec<T>,
        cancel: &CancelToken,
        work: F,
        mut on_complete: C,
    ) -> Result<Vec<JobResult<R>>>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> R + Sync,
        C: FnMut(Completion<'_, R>),
    {
        let total = jobs.len();
        let mut results: Vec<JobResult<R>> = (0..total).map(|_| JobResult::Skipped).collect();
        if total == 0 {
            return Ok(results);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("unfold-worker-{}", i))
            .build()
            .map_err(|e| MeshError::Io(std::io::Error::other(e)))?;

        let queue: Mutex<VecDeque<(usize, T)>> = Mutex::new(jobs.into_iter().enumerate().collect());
        let completed = Mutex::new(0usize);
        let (tx, rx) = mpsc::channel::<(usize, usize, JobResult<R>)>();
        let workers = self.threads.min(total);

        debug!(jobs = total, workers, "starting worker pool");

        pool.in_place_scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let (queue, completed, work) = (&queue, &completed, &work);
                scope.spawn(move |_| loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, job)) = next else {
                        break;
                    };

                    let result = match panic::catch_unwind(AssertUnwindSafe(|| work(&job))) {
                        Ok(output) => JobResult::Finished(output),
                        Err(payload) => JobResult::Panicked(panic_message(payload.as_ref())),
                    };

                    let mut done = completed.lock().unwrap_or_else(PoisonError::into_inner);
                    *done += 1;
                    // The receiver only goes away once every worker is done.
                    let _ = tx.send((index, *done, result));
                });
            }
            drop(tx);

            for (index, done, result) in rx {
                results[index] = result;
                on_complete(Completion {
                    index,
                    completed: done,
                    total,
                    result: &results[index],
                });
            }
        });

        let skipped = results
            .iter()
            .filter(|r| matches!(r, JobResult::Skipped))
            .count();
        if skipped > 0 {
            warn!(skipped, "run cancelled before all jobs started");
        }

        Ok(results)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_zero_threads_rejected() {
        assert!(WorkerPool::new(Some(0)).is_err());
        assert_eq!(WorkerPool::new(Some(3)).unwrap().threads(), 3);
        assert!(WorkerPool::new(None).unwrap().threads() >= 1);
    }

    #[test]
    fn test_every_job_runs_once() {
        let pool = WorkerPool::new(Some(4)).unwrap();
        let runs = AtomicUsize::new(0);
        let results = pool
            .run(
                (0..50).collect(),
                &CancelToken::new(),
                |&x: &usize| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    x * 2
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 50);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(*r, JobResult::Finished(i * 2));
        }
    }

    #[test]
    fn test_completed_count_is_monotonic() {
        let pool = WorkerPool::new(Some(3)).unwrap();
        let mut seen = Vec::new();
        let mut indices = Vec::new();
        pool.run(
            (0..20).collect::<Vec<u64>>(),
            &CancelToken::new(),
            |&x| x + 1,
            |c| {
                assert_eq!(c.total, 20);
                seen.push(c.completed);
                indices.push(c.index);
            },
        )
        .unwrap();

        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
        indices.sort_unstable();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_is_isolated() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let results = pool
            .run(
                vec![1, 2, 3],
                &CancelToken::new(),
                |&x: &i32| {
                    if x == 2 {
                        panic!("bad job {}", x);
                    }
                    x
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(results[0], JobResult::Finished(1));
        assert_eq!(results[1], JobResult::Panicked("bad job 2".to_string()));
        assert_eq!(results[2], JobResult::Finished(3));
    }

    #[test]
    fn test_cancel_drains() {
        let pool = WorkerPool::new(Some(1)).unwrap();
        let cancel = CancelToken::new();
        let results = pool
            .run(
                (0..10).collect::<Vec<i32>>(),
                &cancel,
                |&x| {
                    if x == 2 {
                        cancel.cancel();
                    }
                    x
                },
                |_| {},
            )
            .unwrap();

        // The job that cancelled still finishes; nothing after it starts.
        assert_eq!(results[2], JobResult::Finished(2));
        assert!(results[3..].iter().all(|r| *r == JobResult::Skipped));
    }

    #[test]
    fn test_empty_run() {
        let pool = WorkerPool::new(Some(2)).unwrap();
        let results: Vec<JobResult<()>> =
            pool.run(Vec::<u8>::new(), &CancelToken::new(), |_| (), |_| {}).unwrap();
        assert!(results.is_empty());
    }
}
