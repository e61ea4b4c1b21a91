//! Redis-backed job queue for generation pipelines.
//!
//! This crate provides:
//! - Job submission and consumption via Redis Streams
//! - Per-job state, metadata and results in Redis hashes
//! - Progress events via Redis Pub/Sub

pub mod error;
pub mod job;
pub mod progress;
pub mod queue;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use job::QueuedJob;
pub use progress::ProgressChannel;
pub use queue::{JobQueue, QueueConfig};
pub use store::{JobHandle, JobRecord};
