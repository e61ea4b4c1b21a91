//! HTTP clients for the generation backends.
//!
//! Each client is a plain reqwest wrapper; authentication material is
//! supplied by the caller per request so server keys and per-job overrides
//! go through the same path.

pub mod error;
pub mod image;
pub mod script;
pub mod speech;
pub mod video;

pub use error::{VendorError, VendorResult};
pub use image::ImagenClient;
pub use script::ScriptClient;
pub use speech::ElevenLabsClient;
pub use video::{OperationStatus, SubmittedOperation, VertexVideoClient, VertexVideoConfig};
