//! Fixed-size worker pool over bounded channels.
//!
//! A producer feeds `(index, task)` pairs into a bounded task channel, workers
//! push `(index, result)` pairs into a bounded result channel, and the calling
//! thread collects results back into submission order. The first failed task
//! stops the producer and the workers; its error is returned.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use indicatif::ProgressBar;
use log::debug;

use crate::errors::{CorrectError, Result};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    progress: Option<ProgressBar>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        WorkerPool {
            workers: workers.max(1),
            progress: None,
        }
    }

    /// Tick `progress` once per finished task.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    ///
    /// Run `work` over every task and return the results in submission order.
    ///
    pub fn run<T, R, F>(&self, tasks: Vec<T>, work: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync,
    {
        let task_count = tasks.len();
        if task_count == 0 {
            return Ok(Vec::new());
        }

        let workers = self.workers.min(task_count);
        debug!("Running {} tasks on {} workers", task_count, workers);

        let (task_tx, task_rx) = bounded::<(usize, T)>(workers);
        let (result_tx, result_rx) = bounded::<(usize, Result<R>)>(workers);
        let abort = AtomicBool::new(false);

        let abort = &abort;
        let work = &work;

        thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();

                scope.spawn(move || {
                    while let Ok((index, task)) = task_rx.recv() {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }

                        let result = panic::catch_unwind(AssertUnwindSafe(|| work(task)))
                            .unwrap_or_else(|payload| Err(CorrectError::Worker(panic_message(payload))));

                        if result.is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            scope.spawn(move || {
                for item in tasks.into_iter().enumerate() {
                    if abort.load(Ordering::Relaxed) || task_tx.send(item).is_err() {
                        break;
                    }
                }
            });

            let mut slots: Vec<Option<R>> = (0..task_count).map(|_| None).collect();
            let mut first_error: Option<CorrectError> = None;

            for (index, result) in result_rx.iter() {
                match result {
                    Ok(value) => slots[index] = Some(value),
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
                if let Some(progress) = &self.progress {
                    progress.inc(1);
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }

            slots
                .into_iter()
                .enumerate()
                .map(|(index, slot)| {
                    slot.ok_or_else(|| CorrectError::Worker(format!("task {} produced no result", index)))
                })
                .collect()
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {}", message)
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::sync::atomic::AtomicUsize;

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    fn test_results_in_submission_order(#[case] workers: usize) {
        let pool = WorkerPool::new(workers);
        let tasks: Vec<u64> = (0..50).collect();

        let results = pool
            .run(tasks, |n| {
                // uneven work so results finish out of order
                thread::sleep(std::time::Duration::from_micros((50 - n) * 20));
                Ok(n * n)
            })
            .unwrap();

        assert_eq!(results, (0..50).map(|n| n * n).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_empty_task_list() {
        let pool = WorkerPool::new(4);
        let results: Vec<u8> = pool.run(Vec::<u8>::new(), Ok).unwrap();
        assert!(results.is_empty());
    }

    #[rstest]
    fn test_first_error_aborts() {
        let pool = WorkerPool::new(1);
        let started = AtomicUsize::new(0);

        let result = pool.run((0..100).collect::<Vec<u32>>(), |n| {
            started.fetch_add(1, Ordering::SeqCst);
            if n == 2 {
                Err(CorrectError::RegressionFit("singular".to_string()))
            } else {
                Ok(n)
            }
        });

        assert!(matches!(result, Err(CorrectError::RegressionFit(_))));
        assert!(started.load(Ordering::SeqCst) < 100);
    }

    #[rstest]
    fn test_panic_becomes_worker_error() {
        let pool = WorkerPool::new(2);
        let result = pool.run(vec![1, 2, 3], |n: i32| {
            if n == 2 {
                panic!("bad task");
            }
            Ok(n)
        });

        match result {
            Err(CorrectError::Worker(message)) => assert!(message.contains("bad task")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[rstest]
    fn test_progress_counts_tasks() {
        let progress = ProgressBar::hidden();
        let pool = WorkerPool::new(3).with_progress(progress.clone());
        pool.run((0..7).collect::<Vec<u8>>(), Ok).unwrap();
        assert_eq!(progress.position(), 7);
    }
}
