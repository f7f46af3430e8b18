use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use crate::{BrowseError, BrowseRepository};

type Job = Box<dyn FnOnce(&dyn BrowseRepository) + Send>;

/// Dedicated thread owning a repository. Jobs run one at a time, in
/// submission order, so the underlying connection is never shared.
pub struct QueryWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl QueryWorker {
    pub fn spawn<R>(name: impl Into<String>, repository: R) -> Result<Self, BrowseError>
    where
        R: BrowseRepository + 'static,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                for job in rx {
                    job(&repository);
                }
                log::debug!("[WORKER] {} drained, exiting", thread_name);
            })
            .map_err(|e| BrowseError::Initialization(format!("failed to spawn worker: {}", e)))?;

        Ok(Self {
            jobs: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn submit<F>(&self, job: F) -> Result<(), BrowseError>
    where
        F: FnOnce(&dyn BrowseRepository) + Send + 'static,
    {
        let jobs = self.jobs.as_ref().ok_or(BrowseError::WorkerStopped)?;
        jobs.send(Box::new(job))
            .map_err(|_| BrowseError::WorkerStopped)
    }
}

impl Drop for QueryWorker {
    fn drop(&mut self) {
        // Closing the queue lets the thread finish queued jobs and exit.
        self.jobs.take();

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("[WORKER] query worker panicked");
        }
    }
}
