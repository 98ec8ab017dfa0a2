use crate::progress::ProgressHandle;

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Terminal state of a unit that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The idempotency witness was already present.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub submitted: usize,
    pub done: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

type JobFn = Box<dyn FnOnce() -> Result<Outcome> + Send + 'static>;

struct Job {
    label: String,
    run: JobFn,
}

#[derive(Debug, Default)]
struct Tally {
    done: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

/// Fixed pool of `limit` worker threads fed from an unbounded queue.
///
/// Submitting never blocks. A unit that errors or panics is logged and
/// counted; its siblings keep running and `wait` still returns normally.
pub struct BoundedExecutor {
    limit: usize,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    tally: Arc<Tally>,
    submitted: usize,
    started: Instant,
}

impl BoundedExecutor {
    pub fn new(limit: usize, progress: ProgressHandle) -> Self {
        let limit = limit.max(1);
        let (tx, rx) = unbounded::<Job>();
        let tally = Arc::new(Tally::default());

        let workers = (0..limit)
            .map(|worker_id| {
                let rx = rx.clone();
                let tally = Arc::clone(&tally);
                let progress = progress.clone();
                std::thread::spawn(move || {
                    let op_id = format!("w{:02}", worker_id);
                    for job in rx.iter() {
                        progress.set_operation_status(op_id.clone(), job.label.clone());
                        run_one(job, &tally, &progress);
                        progress.inc_units(1);
                        progress.clear_operation(&op_id);
                    }
                })
            })
            .collect();

        Self {
            limit,
            tx: Some(tx),
            workers,
            tally,
            submitted: 0,
            started: Instant::now(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn submit<F>(&mut self, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> Result<Outcome> + Send + 'static,
    {
        let job = Job {
            label: label.into(),
            run: Box::new(job),
        };
        if let Some(tx) = &self.tx {
            // Workers only exit once the sender is dropped, so the receiver
            // outlives every send.
            if tx.send(job).is_ok() {
                self.submitted += 1;
            }
        }
    }

    /// Blocks until every submitted unit has finished.
    pub fn wait(mut self) -> PassSummary {
        self.tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("executor worker thread exited abnormally");
            }
        }
        PassSummary {
            submitted: self.submitted,
            done: self.tally.done.load(Ordering::Relaxed),
            skipped: self.tally.skipped.load(Ordering::Relaxed),
            failed: self.tally.failed.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_one(job: Job, tally: &Tally, progress: &ProgressHandle) {
    let Job { label, run } = job;
    let result = panic::catch_unwind(AssertUnwindSafe(run))
        .unwrap_or_else(|payload| Err(anyhow!("unit panicked: {}", panic_message(&payload))));

    match result {
        Ok(Outcome::Done) => {
            tally.done.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Outcome::Skipped) => {
            debug!(unit = %label, "already up to date");
            tally.skipped.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            let message = format!("{:#}", err);
            warn!(unit = %label, error = %message, "unit failed");
            progress.warning(format!("{}: {}", label, message));
            tally.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
