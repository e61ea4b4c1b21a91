//! API-side services.

pub mod status;

pub use status::{OperationPoller, StatusResolver};
