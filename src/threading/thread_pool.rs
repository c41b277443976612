// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-size thread pool for opportunistic background work
//!
//! Independent of the capture queues. Tasks are arbitrary closures; each
//! submission returns a [`TaskHandle`] that can be awaited as a future or
//! waited on synchronously.

use super::managed_thread::panic_message;
use crate::errors::{PoolError, TaskError};
use futures::channel::oneshot;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    tasks: VecDeque<Task>,
    active: usize,
    stopped: bool,
}

struct Inner {
    state: Mutex<PoolState>,
    task_available: Condvar,
    idle: Condvar,
}

/// Pool of worker threads executing submitted tasks
pub struct ThreadPool {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl ThreadPool {
    /// Spawn a pool with `threads` workers
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        Self::with_name("pool-worker", threads)
    }

    /// Spawn a pool whose threads are named `<prefix>-<index>`
    pub fn with_name(prefix: &str, threads: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::NoWorkers);
        }

        let pool = Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PoolState {
                    tasks: VecDeque::new(),
                    active: 0,
                    stopped: false,
                }),
                task_available: Condvar::new(),
                idle: Condvar::new(),
            }),
            workers: Mutex::new(Vec::with_capacity(threads)),
            size: threads,
        };

        for index in 0..threads {
            let inner = Arc::clone(&pool.inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", prefix, index))
                .spawn(move || worker_loop(&inner));
            match spawned {
                Ok(handle) => pool.workers.lock().push(handle),
                Err(e) => {
                    error!(error = %e, index, "Failed to spawn pool worker");
                    // Dropping the pool stops the workers spawned so far
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!(threads, prefix, "Thread pool started");
        Ok(pool)
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.size
    }

    /// Tasks queued but not yet started
    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Tasks currently executing
    pub fn active(&self) -> usize {
        self.inner.state.lock().active
    }

    /// Whether `stop()` has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Queue a task and return a handle to its result
    ///
    /// Fails with [`PoolError::Stopped`] once the pool is stopped.
    pub fn add_task<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task: Task = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
                let msg = panic_message(&*payload);
                error!(panic = %msg, "Pool task panicked");
                TaskError::Panicked(msg)
            });
            // The caller may have dropped its handle
            let _ = sender.send(result);
        });

        {
            let mut state = self.inner.state.lock();
            if state.stopped {
                warn!("Task submitted to stopped thread pool");
                return Err(PoolError::Stopped);
            }
            state.tasks.push_back(task);
        }
        self.inner.task_available.notify_one();

        Ok(TaskHandle { receiver })
    }

    /// Block until the queue is empty and no task is running
    ///
    /// The pool keeps accepting tasks afterwards. Calling this from inside a
    /// pool task deadlocks.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock();
        while !(state.tasks.is_empty() && state.active == 0) {
            self.inner.idle.wait(&mut state);
        }
    }

    /// Discard queued tasks, reject new ones and join the workers
    ///
    /// Tasks already running are allowed to finish. Idempotent.
    pub fn stop(&self) {
        let discarded = {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            std::mem::take(&mut state.tasks)
        };
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarding queued pool tasks");
        }
        // Dropping the tasks cancels their handles
        drop(discarded);

        self.inner.task_available.notify_all();

        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                warn!("Thread pool stopped from one of its own workers, not joining it");
                continue;
            }
            if handle.join().is_err() {
                warn!("Pool worker panicked");
            }
        }

        self.inner.idle.notify_all();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.size)
            .field("pending", &self.pending())
            .field("active", &self.active())
            .finish()
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let task = {
            let mut state = inner.state.lock();
            while state.tasks.is_empty() && !state.stopped {
                inner.task_available.wait(&mut state);
            }
            // Stop clears the queue, so an empty queue here means shutdown
            let Some(task) = state.tasks.pop_front() else {
                return;
            };
            state.active += 1;
            task
        };

        task();

        let idle = {
            let mut state = inner.state.lock();
            state.active -= 1;
            state.active == 0 && state.tasks.is_empty()
        };
        if idle {
            inner.idle.notify_all();
        }
    }
}

/// Result of a submitted task
///
/// Implements [`Future`]; use [`TaskHandle::wait`] from synchronous code.
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    receiver: oneshot::Receiver<Result<R, TaskError>>,
}

impl<R> TaskHandle<R> {
    /// Block the calling thread until the task completes
    pub fn wait(self) -> Result<R, TaskError> {
        pollster::block_on(self)
    }

    /// Take the result if the task already completed
    pub fn try_result(&mut self) -> Option<Result<R, TaskError>> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => Some(result),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TaskError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
