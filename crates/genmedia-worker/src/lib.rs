//! Generation pipeline worker.
//!
//! Consumes jobs from the queue and runs the audio and video pipelines,
//! publishing progress events as it goes.

pub mod audio_pipeline;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod script;
pub mod transcode;
pub mod video_pipeline;

pub use config::WorkerConfig;
pub use context::ProcessingContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
