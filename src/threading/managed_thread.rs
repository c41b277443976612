// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management with lifecycle callbacks
//!
//! A [`ManagedThread`] owns one [`Worker`] and runs it on a dedicated OS
//! thread through a fixed wrapper:
//!
//! ```text
//! Started callbacks → Worker::run() → state = Finished → Finished callbacks
//! ```
//!
//! Resources opened by a `Started` callback are therefore ready before the
//! work loop runs, and a `Finished` callback only runs after the loop has
//! returned.
//!
//! `stop()` is advisory. The worker polls [`ThreadContext::is_stop`] and must
//! bound the time between a stop request and returning from `run()`.
//!
//! # Example
//!
//! ```ignore
//! let mut thread = ManagedThread::from_fn("imu-reader", |ctx| {
//!     while !ctx.is_stop() {
//!         read_one_sample();
//!     }
//! });
//! thread.add_callback(CallbackSlot::Started, || open_log());
//! thread.add_callback(CallbackSlot::Finished, || close_log());
//! thread.start()?;
//! thread.stop();
//! thread.wait();
//! ```

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

/// Identifier of a callback list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackSlot {
    /// Fired on the worker thread before `run()`
    Started,
    /// Fired on the worker thread after `run()` returned
    Finished,
    /// Worker-defined slot, fired from inside `run()`
    Custom(u32),
}

/// Zero-argument lifecycle callback
pub type Callback = Box<dyn Fn() + Send + Sync>;

/// Mapping from registered slots to ordered callback lists
#[derive(Default)]
pub struct CallbackRegistry {
    slots: HashMap<CallbackSlot, Vec<Callback>>,
}

impl CallbackRegistry {
    /// Registry with the `Started` and `Finished` slots
    pub fn with_lifecycle_slots() -> Self {
        let mut registry = Self::default();
        registry.register(CallbackSlot::Started);
        registry.register(CallbackSlot::Finished);
        registry
    }

    /// Make a slot available for callbacks
    pub fn register(&mut self, slot: CallbackSlot) {
        self.slots.entry(slot).or_default();
    }

    /// Check whether a slot was registered
    pub fn is_registered(&self, slot: CallbackSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Number of callbacks attached to a slot
    pub fn len(&self, slot: CallbackSlot) -> usize {
        self.slots.get(&slot).map_or(0, Vec::len)
    }

    /// Append a callback to a registered slot
    ///
    /// # Panics
    ///
    /// Panics if the slot was never registered.
    pub fn add(&mut self, slot: CallbackSlot, callback: Callback) {
        match self.slots.get_mut(&slot) {
            Some(list) => list.push(callback),
            None => panic!("callback slot {:?} not registered", slot),
        }
    }

    /// Invoke every callback of a slot in registration order
    ///
    /// # Panics
    ///
    /// Panics if the slot was never registered.
    pub fn fire(&self, slot: CallbackSlot) {
        let Some(list) = self.slots.get(&slot) else {
            panic!("callback slot {:?} not registered", slot);
        };
        for callback in list {
            callback();
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (slot, list) in &self.slots {
            map.entry(slot, &list.len());
        }
        map.finish()
    }
}

/// The work loop of a managed thread
pub trait Worker: Send + 'static {
    /// Main loop; must return promptly once `ctx.is_stop()` is true
    fn run(&mut self, ctx: &ThreadContext);

    /// Extra callback slots this worker fires through [`ThreadContext::fire`]
    fn custom_slots(&self) -> Vec<CallbackSlot> {
        Vec::new()
    }
}

/// Adapter running a closure as a [`Worker`]
pub struct FnWorker<F>(F);

impl<F> Worker for FnWorker<F>
where
    F: FnMut(&ThreadContext) + Send + 'static,
{
    fn run(&mut self, ctx: &ThreadContext) {
        (self.0)(ctx)
    }
}

/// Lifecycle state of a managed thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Never started
    Idle,
    /// Worker is executing
    Running,
    /// Worker returned
    Finished,
}

struct Shared {
    state: Mutex<ThreadState>,
    stop: AtomicBool,
    thread_id: Mutex<Option<ThreadId>>,
}

/// Handle given to the worker while it runs
pub struct ThreadContext {
    name: Arc<str>,
    shared: Arc<Shared>,
    callbacks: Arc<CallbackRegistry>,
}

impl ThreadContext {
    /// Name of the managed thread
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a stop was requested
    pub fn is_stop(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Invoke the callbacks registered on `slot`
    ///
    /// # Panics
    ///
    /// Panics if the slot was never registered.
    pub fn fire(&self, slot: CallbackSlot) {
        self.callbacks.fire(slot);
    }
}

/// Cloneable handle that can request a stop from any thread
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Request the worker to stop
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Whether a stop was requested
    pub fn is_stop(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

/// A worker running on its own thread with start/stop/wait control
pub struct ManagedThread<W: Worker> {
    name: Arc<str>,
    shared: Arc<Shared>,
    callbacks: Arc<CallbackRegistry>,
    // Worker is moved onto the thread while running and handed back on exit
    worker: Arc<Mutex<Option<W>>>,
    handle: Option<JoinHandle<()>>,
}

impl<F> ManagedThread<FnWorker<F>>
where
    F: FnMut(&ThreadContext) + Send + 'static,
{
    /// Create a managed thread running a closure
    pub fn from_fn(name: &str, run: F) -> Self {
        Self::new(name, FnWorker(run))
    }
}

impl<W: Worker> ManagedThread<W> {
    /// Create an idle thread for `worker`
    ///
    /// Registers the `Started` and `Finished` slots plus the worker's custom slots.
    pub fn new(name: &str, worker: W) -> Self {
        let mut callbacks = CallbackRegistry::with_lifecycle_slots();
        for slot in worker.custom_slots() {
            callbacks.register(slot);
        }

        Self {
            name: Arc::from(name),
            shared: Arc::new(Shared {
                state: Mutex::new(ThreadState::Idle),
                stop: AtomicBool::new(false),
                thread_id: Mutex::new(None),
            }),
            callbacks: Arc::new(callbacks),
            worker: Arc::new(Mutex::new(Some(worker))),
            handle: None,
        }
    }

    /// Name given to the OS thread
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> ThreadState {
        *self.shared.state.lock()
    }

    /// Whether the thread has been started at least once
    pub fn is_start(&self) -> bool {
        self.state() != ThreadState::Idle
    }

    /// Whether the worker is executing right now
    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// Whether a stop was requested since the last start
    pub fn is_stop(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Whether the worker has returned
    pub fn is_finish(&self) -> bool {
        self.state() == ThreadState::Finished
    }

    /// Identifier of the most recently started OS thread
    pub fn thread_id(&self) -> Option<ThreadId> {
        *self.shared.thread_id.lock()
    }

    /// Handle for requesting a stop from other threads
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Append a callback to a registered slot
    ///
    /// Callbacks are read without locking by the running thread, so they can
    /// only be added while the thread is not running.
    ///
    /// # Panics
    ///
    /// Panics if the slot was never registered or the thread is running.
    pub fn add_callback<F>(&mut self, slot: CallbackSlot, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_finish() {
            self.join_handle();
        }
        let name = Arc::clone(&self.name);
        let Some(registry) = Arc::get_mut(&mut self.callbacks) else {
            panic!("callbacks of thread \"{}\" must be added while it is not running", name);
        };
        registry.add(slot, Box::new(callback));
    }

    /// Run `f` on the worker while the thread is not running
    ///
    /// Returns `None` while the worker is out on its thread.
    pub fn with_worker<R>(&mut self, f: impl FnOnce(&mut W) -> R) -> Option<R> {
        if self.is_finish() {
            self.join_handle();
        }
        if self.is_running() {
            return None;
        }
        self.worker.lock().as_mut().map(f)
    }

    /// Spawn the worker thread
    ///
    /// Legal from `Idle` and `Finished`. Clears the stop flag.
    ///
    /// # Panics
    ///
    /// Panics if the thread is already running.
    pub fn start(&mut self) -> std::io::Result<()> {
        {
            let mut state = self.shared.state.lock();
            assert!(
                *state != ThreadState::Running,
                "thread \"{}\" started while already running",
                self.name
            );
            // Reclaim a finished thread before reusing the worker
            if let Some(handle) = self.handle.take() {
                drop(state);
                Self::join(&self.name, handle);
                state = self.shared.state.lock();
            }
            *state = ThreadState::Running;
        }
        self.shared.stop.store(false, Ordering::Release);

        let name = Arc::clone(&self.name);
        let shared = Arc::clone(&self.shared);
        let callbacks = Arc::clone(&self.callbacks);
        let worker = Arc::clone(&self.worker);

        let spawned = thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || run_wrapper(name, shared, callbacks, worker));

        match spawned {
            Ok(handle) => {
                info!(name = %self.name, "Thread started");
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(name = %self.name, error = %e, "Failed to spawn thread");
                *self.shared.state.lock() = ThreadState::Finished;
                Err(e)
            }
        }
    }

    /// Request the worker to stop (non-blocking)
    pub fn stop(&self) {
        debug!(name = %self.name, "Requesting thread stop");
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Block until the worker has returned
    ///
    /// No-op if never started; safe to call repeatedly.
    pub fn wait(&mut self) {
        self.join_handle();
    }

    fn join_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            Self::join(&self.name, handle);
        }
    }

    fn join(name: &str, handle: JoinHandle<()>) {
        debug!(name = %name, "Waiting for thread to finish");
        if handle.join().is_err() {
            warn!(name = %name, "Thread wrapper panicked");
        }
    }
}

impl<W: Worker> Drop for ManagedThread<W> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!(name = %self.name, "ManagedThread dropped, stopping worker");
            self.stop();
            self.wait();
        }
    }
}

fn run_wrapper<W: Worker>(
    name: Arc<str>,
    shared: Arc<Shared>,
    callbacks: Arc<CallbackRegistry>,
    worker_slot: Arc<Mutex<Option<W>>>,
) {
    *shared.thread_id.lock() = Some(thread::current().id());

    let Some(mut worker) = worker_slot.lock().take() else {
        error!(name = %name, "Worker missing at thread start");
        *shared.state.lock() = ThreadState::Finished;
        return;
    };

    let ctx = ThreadContext {
        name: Arc::clone(&name),
        shared: Arc::clone(&shared),
        callbacks,
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        ctx.fire(CallbackSlot::Started);
        worker.run(&ctx);
    }));
    if let Err(payload) = outcome {
        error!(name = %name, panic = %panic_message(&*payload), "Worker panicked");
    }

    // Hand the worker back before anyone can observe Finished
    *worker_slot.lock() = Some(worker);
    *shared.state.lock() = ThreadState::Finished;

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| ctx.fire(CallbackSlot::Finished))) {
        error!(name = %name, panic = %panic_message(&*payload), "Finished callback panicked");
    }

    debug!(name = %name, "Thread exiting");
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
