//! File-backed storage engine for an S3-compatible test server.
//!
//! Buckets, objects, object versions, and multipart uploads are persisted as
//! folders of JSON metadata and raw payload files under a single storage
//! root, so stored state survives restarts and can be inspected with plain
//! filesystem tools.
//!
//! The engine is synchronous and thread-safe: every bucket, object, and
//! upload has its own lazily created monitor, mutations to one entity are
//! strictly serialized, and independent entities proceed in parallel.
//!
//! # Example
//!
//! ```
//! use mocks3_store::{FileStore, StoreConfig};
//! use mocks3_store::store::PutObjectRequest;
//!
//! # fn main() -> mocks3_store::StoreResult<()> {
//! let store = FileStore::open(StoreConfig::default())?;
//! let bucket = store.bucket_store().create_bucket(
//!     "demo", "us-east-1", "BucketOwnerEnforced", false, None,
//! )?;
//!
//! let id = store.bucket_store().add_key_to_bucket("demo", "hello.txt")?;
//! let payload = store.root().join("incoming");
//! std::fs::write(&payload, b"hello world").unwrap();
//! let meta = store.object_store().store_object(
//!     &bucket,
//!     id,
//!     &payload,
//!     PutObjectRequest::builder().key("hello.txt").build(),
//! )?;
//! assert_eq!(meta.etag, "5eb63bbbe01eeed093cb22bb8f5acdc3");
//! # Ok(())
//! # }
//! ```

pub mod checksums;
pub mod config;
pub mod error;
pub mod locks;
pub mod meta;
pub mod service;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use service::FileStore;
