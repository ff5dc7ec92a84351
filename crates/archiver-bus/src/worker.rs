//! The dedicated worker thread that owns the `Database` exclusively
//!: every request is serialized onto this thread's
//! `std::sync::mpsc` queue and runs to completion before the next one
//! is even looked at, giving the whole bus its single-writer guarantee
//! for free instead of needing a lock inside `Database` itself.

use std::sync::mpsc;
use std::thread::JoinHandle;

use archiver_db::Database;

use crate::error::LOG_TARGET;

/// A unit of work already bound to its reply channel: the worker just
/// calls it with a `&mut Database` and moves on.
pub(crate) type Job = Box<dyn FnOnce(&mut Database) + Send>;

pub(crate) struct Worker {
    tx: Option<mpsc::Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(mut db: Database) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("archiver-db-worker".to_owned())
            .spawn(move || {
                tracing::debug!(target: LOG_TARGET, "worker thread started");
                while let Ok(job) = rx.recv() {
                    job(&mut db);
                }
                tracing::debug!(target: LOG_TARGET, "worker thread exiting, all senders dropped");
            })
            .expect("failed to spawn archiver-db-worker thread");

        Self { tx: Some(tx), handle: Some(handle) }
    }

    /// Submits `job` to the worker. Returns `Err(job)` if the worker
    /// thread has already exited, handing the job back so the caller
    /// can decide how to fail (matters because `Job` isn't `Clone`).
    pub(crate) fn submit(&self, job: Job) -> Result<(), Job> {
        match &self.tx {
            Some(tx) => tx.send(job).map_err(|mpsc::SendError(job)| job),
            None => Err(job),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Drop the sender first so the worker's `rx.recv()` loop unblocks,
        // then join so the database file is closed deterministically
        // before we return.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
