// SPDX-License-Identifier: GPL-3.0-only

//! Producer loop: device reads to channel queues

use crate::backends::CaptureSource;
use crate::backends::types::{Record, TimestampSource, host_timestamp};
use crate::constants::timing::READ_ERROR_BACKOFF;
use crate::errors::SourceError;
use crate::threading::{BoundedJobQueue, ThreadContext, Worker};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Destination queue of one channel
pub(crate) struct Route<R> {
    pub(crate) name: String,
    pub(crate) queue: Arc<BoundedJobQueue<Record<R>>>,
    sequence: u64,
}

impl<R> Route<R> {
    pub(crate) fn new(name: String, queue: Arc<BoundedJobQueue<Record<R>>>) -> Self {
        Self {
            name,
            queue,
            sequence: 0,
        }
    }
}

/// Capture loop run by the pipeline's producer thread
///
/// Reads the source until a stop is requested, the source reports end of
/// stream, or a queue refuses a push. The source is released on the producer
/// thread right after the loop, before the pipeline drains any queue.
pub(crate) struct ProducerLoop<S: CaptureSource> {
    source: S,
    routes: Vec<Route<S::Reading>>,
    timestamp_source: TimestampSource,
    released: bool,
}

impl<S: CaptureSource> ProducerLoop<S> {
    /// `source` must already be open
    pub(crate) fn new(
        source: S,
        routes: Vec<Route<S::Reading>>,
        timestamp_source: TimestampSource,
    ) -> Self {
        Self {
            source,
            routes,
            timestamp_source,
            released: false,
        }
    }

    /// Release the device once
    pub(crate) fn release_source(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            debug!(source = self.source.name(), "Capture source released");
        }
    }

    fn stamp(&self, sensor_timestamp: Option<f64>) -> (f64, Option<f64>) {
        let host = host_timestamp();
        match (self.timestamp_source, sensor_timestamp) {
            (TimestampSource::Sensor, Some(sensor)) => (sensor, Some(host)),
            _ => (host, None),
        }
    }
}

impl<S: CaptureSource> Worker for ProducerLoop<S> {
    fn run(&mut self, ctx: &ThreadContext) {
        info!(name = %ctx.name(), source = self.source.name(), "Capture loop started");
        let mut produced: u64 = 0;

        'capture: while !ctx.is_stop() {
            let samples = match self.source.read() {
                Ok(samples) => samples,
                Err(SourceError::EndOfStream) => {
                    info!(name = %ctx.name(), "Source reached end of stream");
                    break;
                }
                Err(e) => {
                    warn!(name = %ctx.name(), error = %e, "Read failed");
                    thread::sleep(READ_ERROR_BACKOFF);
                    continue;
                }
            };

            // A batch is pushed completely; stop is checked between reads
            for sample in samples {
                let (timestamp, system_timestamp) = self.stamp(sample.sensor_timestamp);
                let Some(route) = self.routes.get_mut(sample.channel.index()) else {
                    warn!(name = %ctx.name(), channel = %sample.channel, "Sample for unknown channel dropped");
                    continue;
                };

                let record = Record {
                    timestamp,
                    system_timestamp,
                    sequence: route.sequence,
                    reading: sample.reading,
                };
                route.sequence += 1;

                if !route.queue.push(record) {
                    debug!(name = %ctx.name(), channel = %route.name, "Queue stopped, leaving capture loop");
                    break 'capture;
                }
                produced += 1;
            }
        }

        self.release_source();
        info!(name = %ctx.name(), produced, "Capture loop finished");
    }
}
