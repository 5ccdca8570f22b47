//! Blob storage plumbing using Apache OpenDAL.
//!
//! The local, object-storage, and managed providers all keep one JSON object
//! per session. This module gives them a common [`BlobStore`] plus operator
//! builders for each supported service:
//! - S3-compatible: AWS S3, Cloudflare R2, MinIO, and the managed
//!   platform's storage API (Supabase)
//! - Local filesystem
//! - In-process memory (tests)

mod blob;
mod error;
pub mod operator;

pub use blob::{BlobStore, SESSION_SUFFIX, file_name, id_from_key};
