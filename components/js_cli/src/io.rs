//! Background I/O worker.
//!
//! Blocking file operations run on one dedicated thread so the loop thread
//! never stalls on the filesystem. Jobs are plain `Send` closures; anything
//! they report back goes through a reserved completion slot, never through
//! script values.

use crossbeam_channel::{unbounded, Sender};
use std::fmt;
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// A single worker thread draining a job channel.
pub struct IoWorker {
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl IoWorker {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn() -> io::Result<Self> {
        let (jobs, receiver) = unbounded::<Job>();
        let handle = thread::Builder::new()
            .name("jsrun-io".to_string())
            .spawn(move || {
                for job in receiver {
                    job();
                }
                debug!("io worker exiting");
            })?;
        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }

    /// Hands `job` to the worker.
    ///
    /// Returns false if the worker has gone away. The job is dropped in that
    /// case, which releases anything it owns.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.jobs {
            Some(jobs) => jobs.send(Box::new(job)).is_ok(),
            None => false,
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("io worker panicked");
            }
        }
    }
}

impl fmt::Debug for IoWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoWorker")
            .field("running", &self.jobs.is_some())
            .finish()
    }
}
