//! Google Cloud Storage access for generated artifacts.
//!
//! This crate provides:
//! - Byte uploads via the JSON API
//! - Best-effort public-read ACLs with a uniform-bucket fallback
//! - Canonical public URL derivation (`gs://` to `https://`)

pub mod client;
pub mod error;
pub mod token_cache;

pub use client::{resolve_public_url, GcsClient, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use token_cache::TokenCache;
