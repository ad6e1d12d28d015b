//! Background worker pool.
//!
//! Event sources hand work to the pool and return immediately. Jobs are
//! queued on an unbounded channel and drained by a fixed set of named worker
//! threads. There is no cancellation: a queued job always runs.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counts submitted jobs that have not finished yet.
#[derive(Debug, Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn start(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// A fixed-size pool of worker threads fed by an unbounded queue.
#[derive(Debug)]
pub struct TaskPool {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
}

impl TaskPool {
    /// Spawn `workers` threads named `{name}-{index}`.
    pub fn new(name: &str, workers: usize) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(Pending::default());

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let pending = pending.clone();
            let thread_name = format!("{}-{}", name, index);
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(&thread_name, &receiver, &pending))?;
            handles.push(handle);
        }

        debug!("Task pool {} started with {} workers", name, handles.len());

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            pending,
        })
    }

    /// Queue a job without blocking.
    ///
    /// Returns false if the pool has been shut down; the job is dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            debug!("Task pool {} is shut down, dropping job", self.name);
            return false;
        };

        self.pending.start();
        if sender.send(Box::new(job)).is_err() {
            self.pending.finish();
            return false;
        }
        true
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every submitted job has finished or `timeout` elapses.
    ///
    /// Returns true if the pool went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self.pending.count.lock().unwrap_or_else(PoisonError::into_inner);
        let (count, _) = self
            .pending
            .idle
            .wait_timeout_while(count, timeout, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }

    /// Stop accepting jobs, let the queue drain and join the workers.
    pub fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();

        let current = std::thread::current().id();
        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for handle in handles {
            // A worker cannot join itself; it exits once the queue is drained.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Task pool {} worker exited abnormally", self.name);
            }
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the queue is enough; workers finish what is left and exit.
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

fn worker_loop(name: &str, receiver: &Mutex<mpsc::Receiver<Job>>, pending: &Pending) {
    loop {
        let job = receiver.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = job else {
            break; // Queue closed and drained
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
            warn!("Job panicked on {}: {}", name, panic_message(&*panic));
        }
        pending.finish();
    }
    debug!("Worker {} exiting", name);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
