//! Object store client.
//!
//! This crate provides:
//! - The `ObjectStore` capability used by the pipeline
//! - Streaming download of raw objects into local scratch files
//! - Upload of renditions followed by a public-read ACL change
//! - An S3 API implementation (`S3ObjectStore`)

pub mod client;
pub mod error;
pub mod store;

pub use client::{ObjectStoreConfig, S3ObjectStore};
pub use error::{StorageError, StorageResult};
pub use store::{content_type_for, ObjectStore};
