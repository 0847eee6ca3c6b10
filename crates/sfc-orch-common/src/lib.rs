//! Common orchestration primitives for the SFC renderer.
//!
//! - [`RefCountMap`]: per-key holder counts
//! - [`RetryPolicy`]: bounded retry with linear backoff
//! - [`SerialWorker`]: single-worker FIFO task queue with a bounded drain

mod ref_count;
mod retry;
mod worker;

pub use ref_count::{RefCountError, RefCountMap};
pub use retry::RetryPolicy;
pub use worker::{SerialWorker, WorkerClosed};
