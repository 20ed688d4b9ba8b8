//! Object storage for rendered variants.
//!
//! Uses the S3 API against Cloudflare R2 or any compatible endpoint.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{ObjectStore, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{variant_key, VARIANT_CONTENT_TYPE};
