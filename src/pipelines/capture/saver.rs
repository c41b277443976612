// SPDX-License-Identifier: GPL-3.0-only

//! Saver workers: queue to transform to sink

use super::channel::ChannelCounters;
use crate::backends::types::{ChannelId, Record};
use crate::errors::TransformError;
use crate::threading::managed_thread::panic_message;
use crate::threading::{BoundedJobQueue, ThreadContext, Worker};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Transform applied to every record, e.g. JPEG compression
pub type Transform<R, O> = Arc<dyn Fn(Record<R>) -> Result<O, TransformError> + Send + Sync>;

/// Consumer of transformed records
pub type Sink<O> = Arc<dyn Fn(ChannelId, O) + Send + Sync>;

/// Work loop of one saver thread
///
/// Runs until the queue hands out the end-of-stream job. The stop flag of
/// the managed thread is not consulted: the pipeline ends savers by stopping
/// their queue after it drained.
pub(crate) struct SaverLoop<R, O> {
    pub(crate) channel: ChannelId,
    pub(crate) channel_name: Arc<str>,
    pub(crate) queue: Arc<BoundedJobQueue<Record<R>>>,
    pub(crate) transform: Transform<R, O>,
    pub(crate) sink: Sink<O>,
    pub(crate) counters: Arc<ChannelCounters>,
}

impl<R, O> SaverLoop<R, O> {
    fn process(&self, record: Record<R>) {
        let sequence = record.sequence;

        let output = match panic::catch_unwind(AssertUnwindSafe(|| (self.transform)(record))) {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(channel = %self.channel_name, sequence, error = %e, "Transform failed, record dropped");
                self.counters.record_failed();
                return;
            }
            Err(payload) => {
                error!(
                    channel = %self.channel_name,
                    sequence,
                    panic = %panic_message(&*payload),
                    "Transform panicked, record dropped"
                );
                self.counters.record_failed();
                return;
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| (self.sink)(self.channel, output))) {
            Ok(()) => self.counters.record_processed(),
            Err(payload) => {
                error!(
                    channel = %self.channel_name,
                    sequence,
                    panic = %panic_message(&*payload),
                    "Sink panicked"
                );
                self.counters.record_failed();
            }
        }
    }
}

impl<R, O> Worker for SaverLoop<R, O>
where
    R: Send + 'static,
    O: Send + 'static,
{
    fn run(&mut self, ctx: &ThreadContext) {
        debug!(name = %ctx.name(), "Saver started");
        for record in self.queue.jobs() {
            self.process(record);
        }
        debug!(name = %ctx.name(), "Saver finished");
    }
}
