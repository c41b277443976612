// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipeline: one producer, a queue and saver group per channel
//!
//! ```text
//!                    ┌────────── channel 0 ──────────┐
//!                    │ BoundedJobQueue ─▶ saver × N  │──┐
//! ┌──────────┐ push  │                               │  │  transform
//! │ producer │ ────▶ ├────────── channel 1 ──────────┤  ├──────────▶ sink
//! │  thread  │       │ BoundedJobQueue ─▶ saver × N  │──┘
//! └──────────┘       └───────────────────────────────┘
//! ```
//!
//! Lifecycle: `Configured → Initialized → Streaming → Draining → Stopped`.
//!
//! Channel settings, the timestamp source and the transform/sink hooks can
//! only be changed while `Configured`; afterwards the setters fail with
//! [`PipelineError::AlreadyInitialized`].
//!
//! Shutdown is `stop()` followed by `wait()`. `wait()` joins the producer
//! (which releases the device), then for every channel waits for the queue
//! to drain before stopping it, joins the savers and finally fires the
//! pipeline's `Finished` callbacks on the calling thread.

mod channel;
mod producer;
mod saver;

pub use channel::{ChannelSettings, ChannelStats};
pub use saver::{Sink, Transform};

use crate::backends::CaptureSource;
use crate::backends::types::{ChannelId, Record, TimestampSource};
use crate::errors::{PipelineError, TransformError};
use crate::threading::managed_thread::panic_message;
use crate::threading::{
    BoundedJobQueue, Callback, CallbackSlot, ManagedThread, QueueStats, StopHandle,
};
use channel::ChannelCounters;
use producer::{ProducerLoop, Route};
use saver::SaverLoop;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting configuration
    Configured,
    /// Queues and savers exist, producer not started
    Initialized,
    /// Producer started
    Streaming,
    /// Queues draining inside `wait()`
    Draining,
    /// Fully quiesced; terminal
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Configured => "configured",
            PipelineState::Initialized => "initialized",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

struct Channel<R: Send + 'static, O: Send + 'static> {
    id: ChannelId,
    name: String,
    settings: ChannelSettings,
    queue: Option<Arc<BoundedJobQueue<Record<R>>>>,
    workers: Vec<ManagedThread<SaverLoop<R, O>>>,
    counters: Arc<ChannelCounters>,
}

impl<R: Send + 'static, O: Send + 'static> Channel<R, O> {
    fn stats(&self) -> ChannelStats {
        let (queue, pending) = match &self.queue {
            Some(queue) => (queue.stats(), queue.size()),
            None => (QueueStats::default(), 0),
        };
        ChannelStats {
            id: self.id,
            name: self.name.clone(),
            settings: self.settings,
            queue,
            pending,
            processed: self.counters.processed(),
            failed: self.counters.failed(),
        }
    }

    /// Drain, stop and join, in that order
    fn shut_down(&mut self) {
        if let Some(queue) = &self.queue {
            debug!(channel = %self.name, pending = queue.size(), "Draining channel queue");
            queue.wait();
            queue.stop();
        }
        for worker in &mut self.workers {
            worker.wait();
        }
    }
}

/// Producer/queue/saver composition for one capture source
///
/// `O` is the transform output handed to the sink.
pub struct CapturePipeline<S: CaptureSource, O: Send + 'static> {
    name: String,
    state: PipelineState,
    timestamp_source: TimestampSource,
    channels: Vec<Channel<S::Reading, O>>,
    source: Option<S>,
    transform: Option<Transform<S::Reading, O>>,
    sink: Option<Sink<O>>,
    started_callbacks: Vec<Callback>,
    finished_callbacks: Vec<Callback>,
    producer: Option<ManagedThread<ProducerLoop<S>>>,
}

impl<S: CaptureSource, O: Send + 'static> CapturePipeline<S, O> {
    /// Create a pipeline with one channel per source output
    ///
    /// Every channel starts with [`ChannelSettings::default`].
    pub fn new(name: &str, source: S) -> Self {
        let channels = source
            .channels()
            .into_iter()
            .enumerate()
            .map(|(index, channel_name)| Channel {
                id: ChannelId(index),
                name: channel_name,
                settings: ChannelSettings::default(),
                queue: None,
                workers: Vec::new(),
                counters: Arc::new(ChannelCounters::default()),
            })
            .collect();

        Self {
            name: name.to_string(),
            state: PipelineState::Configured,
            timestamp_source: TimestampSource::default(),
            channels,
            source: Some(source),
            transform: None,
            sink: None,
            started_callbacks: Vec::new(),
            finished_callbacks: Vec::new(),
            producer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Look up a channel by the name the source gave it
    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channels.iter().find(|c| c.name == name).map(|c| c.id)
    }

    pub fn channel_settings(&self, channel: ChannelId) -> Option<ChannelSettings> {
        self.channels.get(channel.index()).map(|c| c.settings)
    }

    fn ensure_configurable(&self, what: &'static str) -> Result<(), PipelineError> {
        if self.state == PipelineState::Configured {
            Ok(())
        } else {
            warn!(name = %self.name, setting = what, "Ignoring configuration change after init()");
            Err(PipelineError::AlreadyInitialized(what))
        }
    }

    fn channel_mut(
        &mut self,
        channel: ChannelId,
        what: &'static str,
    ) -> Result<&mut ChannelSettings, PipelineError> {
        self.ensure_configurable(what)?;
        self.channels
            .get_mut(channel.index())
            .map(|c| &mut c.settings)
            .ok_or(PipelineError::UnknownChannel(channel.index()))
    }

    /// Replace all settings of one channel
    pub fn set_channel_settings(
        &mut self,
        channel: ChannelId,
        settings: ChannelSettings,
    ) -> Result<(), PipelineError> {
        *self.channel_mut(channel, "channel settings")? = settings;
        Ok(())
    }

    /// Queue capacity of one channel
    pub fn set_capacity(&mut self, channel: ChannelId, capacity: usize) -> Result<(), PipelineError> {
        self.channel_mut(channel, "queue capacity")?.capacity = capacity;
        Ok(())
    }

    /// Block or drop when one channel's queue is full
    pub fn set_overflow_policy(
        &mut self,
        channel: ChannelId,
        policy: crate::threading::OverflowPolicy,
    ) -> Result<(), PipelineError> {
        self.channel_mut(channel, "overflow policy")?.overflow = policy;
        Ok(())
    }

    /// Saver threads of one channel
    pub fn set_saver_threads(&mut self, channel: ChannelId, workers: usize) -> Result<(), PipelineError> {
        self.channel_mut(channel, "saver thread count")?.workers = workers;
        Ok(())
    }

    /// Saver threads of every channel
    pub fn set_saver_thread_num(&mut self, workers: usize) -> Result<(), PipelineError> {
        self.ensure_configurable("saver thread count")?;
        for channel in &mut self.channels {
            channel.settings.workers = workers;
        }
        Ok(())
    }

    pub fn set_timestamp_source(&mut self, source: TimestampSource) -> Result<(), PipelineError> {
        self.ensure_configurable("timestamp source")?;
        self.timestamp_source = source;
        Ok(())
    }

    /// Function run by the savers on every record
    ///
    /// Errors are logged and drop the record; the saver keeps going.
    pub fn set_transform<F>(&mut self, transform: F) -> Result<(), PipelineError>
    where
        F: Fn(Record<S::Reading>) -> Result<O, TransformError> + Send + Sync + 'static,
    {
        self.ensure_configurable("transform")?;
        self.transform = Some(Arc::new(transform));
        Ok(())
    }

    /// Function receiving every transformed record
    ///
    /// Called concurrently from all savers of all channels.
    pub fn set_sink<F>(&mut self, sink: F) -> Result<(), PipelineError>
    where
        F: Fn(ChannelId, O) + Send + Sync + 'static,
    {
        self.ensure_configurable("sink")?;
        self.sink = Some(Arc::new(sink));
        Ok(())
    }

    /// Register a lifecycle callback
    ///
    /// `Started` callbacks run on the producer thread before the first read.
    /// `Finished` callbacks run on the thread calling `wait()`, after every
    /// saver has returned.
    ///
    /// # Panics
    ///
    /// Panics for custom slots, which pipelines do not register, and when
    /// adding a `Started` callback while the producer runs.
    pub fn add_callback<F>(&mut self, slot: CallbackSlot, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        match slot {
            CallbackSlot::Started => match &mut self.producer {
                Some(producer) => producer.add_callback(slot, callback),
                None => self.started_callbacks.push(Box::new(callback)),
            },
            CallbackSlot::Finished => self.finished_callbacks.push(Box::new(callback)),
            CallbackSlot::Custom(_) => {
                panic!("callback slot {:?} not registered on pipeline \"{}\"", slot, self.name)
            }
        }
    }

    /// Open the source, create the queues and start the savers
    pub fn init(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Configured {
            return Err(PipelineError::InvalidState {
                operation: "init",
                state: self.state.to_string(),
            });
        }
        let transform = self.transform.clone().ok_or(PipelineError::MissingFunction("transform"))?;
        let sink = self.sink.clone().ok_or(PipelineError::MissingFunction("sink"))?;

        if self.channels.is_empty() {
            return Err(PipelineError::InvalidConfig("source has no channels".to_string()));
        }
        for channel in &self.channels {
            channel
                .settings
                .check()
                .map_err(|reason| PipelineError::InvalidConfig(format!("channel {}: {}", channel.name, reason)))?;
        }

        let Some(mut source) = self.source.take() else {
            return Err(PipelineError::InvalidState {
                operation: "init",
                state: "without a source".to_string(),
            });
        };
        if let Err(e) = source.open() {
            error!(name = %self.name, source = source.name(), error = %e, "Failed to open capture source");
            self.source = Some(source);
            return Err(e.into());
        }

        let mut routes = Vec::with_capacity(self.channels.len());
        for channel in &mut self.channels {
            let queue = Arc::new(BoundedJobQueue::with_policy(
                channel.settings.capacity,
                channel.settings.overflow,
            ));
            channel.queue = Some(Arc::clone(&queue));
            routes.push(Route::new(channel.name.clone(), queue));
        }

        let mut producer = ManagedThread::new(
            &format!("{}-producer", self.name),
            ProducerLoop::new(source, routes, self.timestamp_source),
        );
        for callback in self.started_callbacks.drain(..) {
            producer.add_callback(CallbackSlot::Started, callback);
        }
        self.producer = Some(producer);

        if let Err(e) = self.spawn_savers(&transform, &sink) {
            error!(name = %self.name, error = %e, "Failed to start saver threads");
            self.tear_down();
            self.state = PipelineState::Stopped;
            return Err(e.into());
        }

        self.state = PipelineState::Initialized;
        info!(
            name = %self.name,
            channels = self.channels.len(),
            timestamp_source = ?self.timestamp_source,
            "Capture pipeline initialized"
        );
        Ok(())
    }

    fn spawn_savers(
        &mut self,
        transform: &Transform<S::Reading, O>,
        sink: &Sink<O>,
    ) -> std::io::Result<()> {
        for channel in &mut self.channels {
            let Some(queue) = &channel.queue else {
                continue;
            };
            let channel_name: Arc<str> = Arc::from(channel.name.as_str());
            for index in 0..channel.settings.workers {
                let mut worker = ManagedThread::new(
                    &format!("{}-{}-saver-{}", self.name, channel.name, index),
                    SaverLoop {
                        channel: channel.id,
                        channel_name: Arc::clone(&channel_name),
                        queue: Arc::clone(queue),
                        transform: Arc::clone(transform),
                        sink: Arc::clone(sink),
                        counters: Arc::clone(&channel.counters),
                    },
                );
                worker.start()?;
                channel.workers.push(worker);
            }
            debug!(
                name = %self.name,
                channel = %channel.name,
                capacity = channel.settings.capacity,
                overflow = ?channel.settings.overflow,
                workers = channel.settings.workers,
                "Channel ready"
            );
        }
        Ok(())
    }

    /// Start the producer thread
    ///
    /// # Panics
    ///
    /// Panics if the pipeline is already streaming.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Configured => return Err(PipelineError::NotInitialized),
            PipelineState::Initialized => {}
            PipelineState::Streaming => panic!("pipeline \"{}\" started twice", self.name),
            PipelineState::Draining | PipelineState::Stopped => {
                return Err(PipelineError::InvalidState {
                    operation: "start",
                    state: self.state.to_string(),
                });
            }
        }

        let Some(producer) = &mut self.producer else {
            return Err(PipelineError::NotInitialized);
        };
        // Starting the thread clears its stop flag
        let stop_requested = producer.is_stop();
        producer.start()?;
        if stop_requested {
            debug!(name = %self.name, "Stop requested before start");
            producer.stop();
        }
        self.state = PipelineState::Streaming;
        info!(name = %self.name, "Capture pipeline streaming");
        Ok(())
    }

    /// Ask the producer to stop (non-blocking)
    ///
    /// Follow with `wait()` to drain the queues and join every thread.
    pub fn stop(&self) {
        if let Some(producer) = &self.producer {
            info!(name = %self.name, "Stopping capture pipeline");
            producer.stop();
        }
    }

    /// Handle for stopping the producer from another thread, after `init()`
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.producer.as_ref().map(ManagedThread::stop_handle)
    }

    /// Block until the pipeline is fully quiesced
    ///
    /// Without a prior `stop()` this waits for the source to end its stream.
    /// No-op before `init()` and after the pipeline stopped.
    pub fn wait(&mut self) {
        if matches!(self.state, PipelineState::Configured | PipelineState::Stopped) {
            return;
        }

        let started = self.producer.as_ref().is_some_and(ManagedThread::is_start);
        if let Some(producer) = &mut self.producer {
            producer.wait();
        }

        self.state = PipelineState::Draining;
        self.tear_down();

        if started {
            for callback in &self.finished_callbacks {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                    error!(name = %self.name, panic = %panic_message(&*payload), "Finished callback panicked");
                }
            }
        }

        self.state = PipelineState::Stopped;
        for stats in self.channel_stats() {
            info!(
                name = %self.name,
                channel = %stats.name,
                processed = stats.processed,
                failed = stats.failed,
                dropped = stats.queue.dropped,
                stalled = stats.queue.stalled,
                "Channel finished"
            );
        }
    }

    /// Release the device, then drain and join every channel
    fn tear_down(&mut self) {
        if let Some(producer) = &mut self.producer {
            producer.with_worker(ProducerLoop::release_source);
        }
        for channel in &mut self.channels {
            channel.shut_down();
        }
    }

    /// Whether the producer has been started
    pub fn is_start(&self) -> bool {
        self.producer.as_ref().is_some_and(ManagedThread::is_start)
    }

    /// Whether a stop was requested
    pub fn is_stop(&self) -> bool {
        self.producer.as_ref().is_some_and(ManagedThread::is_stop)
    }

    /// Whether the pipeline is fully stopped
    pub fn is_finish(&self) -> bool {
        self.state == PipelineState::Stopped
    }

    /// Whether the producer is still capturing
    pub fn is_running(&self) -> bool {
        self.producer.as_ref().is_some_and(ManagedThread::is_running)
    }

    /// Statistics of every channel
    pub fn channel_stats(&self) -> Vec<ChannelStats> {
        self.channels.iter().map(Channel::stats).collect()
    }

    /// Statistics of one channel
    pub fn stats(&self, channel: ChannelId) -> Option<ChannelStats> {
        self.channels.get(channel.index()).map(Channel::stats)
    }
}

impl<S: CaptureSource, O: Send + 'static> Drop for CapturePipeline<S, O> {
    fn drop(&mut self) {
        if !matches!(self.state, PipelineState::Configured | PipelineState::Stopped) {
            debug!(name = %self.name, "Capture pipeline dropped, shutting down");
            self.stop();
            self.wait();
        }
    }
}

impl<S: CaptureSource, O: Send + 'static> fmt::Debug for CapturePipeline<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("channels", &self.channels.len())
            .finish()
    }
}
