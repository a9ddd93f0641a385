use std::{
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{channel, Sender},
        Mutex, PoisonError,
    },
    thread::{JoinHandle, ThreadId},
};

use log::{debug, error, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run work off the calling thread.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job on the caller's thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl Executor for Inline {
    fn execute(&self, job: Job) {
        job()
    }
}

/// A single background thread draining a job queue in submission order.
///
/// Dropping the worker closes the queue, lets the already queued jobs
/// finish and joins the thread. When the last reference goes away inside
/// one of its own jobs the thread is detached instead and exits once the
/// queue is drained.
pub struct Worker {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Worker {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = channel::<Job>();
        let thread_name = name.to_string();
        let thread = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                for job in receiver {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("{thread_name}: job panicked");
                    }
                }
                debug!("{thread_name}: queue closed");
            })?;
        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }
}

impl Executor for Worker {
    fn execute(&self, job: Job) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    warn!("{}: worker thread is gone, job dropped", self.name);
                }
            }
            None => warn!("{}: worker shut down, job dropped", self.name),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if std::thread::current().id() == self.thread_id {
            debug!("{}: dropped on its own thread, detaching", self.name);
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("{}: worker thread panicked", self.name);
            }
        }
    }
}
