// SPDX-License-Identifier: GPL-3.0-only

//! Concurrency primitives shared by every capture pipeline
//!
//! ```text
//! ┌──────────────────┐   push    ┌──────────────────┐   pop    ┌────────────┐
//! │  ManagedThread   │ ────────▶ │ BoundedJobQueue  │ ───────▶ │  workers   │
//! │  (producer loop) │           │ (bounded FIFO)   │          │ (N per ch) │
//! └──────────────────┘           └──────────────────┘          └────────────┘
//!
//!                ┌──────────────────┐
//!                │    ThreadPool    │  independent background tasks
//!                └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`job_queue`]: Bounded job queue with blocking or dropping overflow
//! - [`managed_thread`]: Start/stop/wait thread wrapper with lifecycle callbacks
//! - [`thread_pool`]: Fixed-size executor returning awaitable task handles

pub mod job_queue;
pub mod managed_thread;
pub mod thread_pool;

pub use job_queue::{BoundedJobQueue, Job, Jobs, OverflowPolicy, QueueStats};
pub use managed_thread::{
    Callback, CallbackRegistry, CallbackSlot, FnWorker, ManagedThread, StopHandle, ThreadContext,
    ThreadState, Worker,
};
pub use thread_pool::{TaskHandle, ThreadPool};
