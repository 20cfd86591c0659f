//! Firestore REST API client.
//!
//! This crate provides:
//! - The `VideoStore` capability used by the duplicate guard and the pipeline
//! - `VideoRepository`, its Firestore-backed implementation
//! - Merge updates with `updateMask` and optimistic write preconditions
//! - Service account or ADC authentication via gcp_auth (none for the emulator)
//! - Opt-in retry with exponential backoff

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use repos::{VideoRepository, VideoSnapshot, VideoStore, WritePrecondition};
#[cfg(feature = "mock")]
pub use repos::MockVideoStore;
pub use retry::RetryConfig;
pub use types::{Document, FromFirestoreValue, Precondition, ToFirestoreValue, Value};
