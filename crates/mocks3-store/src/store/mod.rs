//! The file-backed stores.
//!
//! Three stores share one on-disk layout under the storage root:
//!
//! ```text
//! {root}/{bucket}/bucket.json                         bucket metadata + key index
//! {root}/{bucket}/{objectId}/metadata.json            unversioned object metadata
//! {root}/{bucket}/{objectId}/payload                  unversioned object payload
//! {root}/{bucket}/{objectId}/versions.json            version chain
//! {root}/{bucket}/{objectId}/{versionId}-metadata.json
//! {root}/{bucket}/{objectId}/{versionId}-payload
//! {root}/{bucket}/multiparts/{uploadId}/upload.json   upload record
//! {root}/{bucket}/multiparts/{uploadId}/{n}.part      part payloads
//! ```
//!
//! All metadata files are whole-file JSON rewrites performed under the
//! owning entity's monitor; payload files are written once and never
//! modified in place.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

pub mod bucket;
pub mod multipart;
pub mod object;

pub use bucket::BucketStore;
pub use multipart::{CompletedUpload, CreateMultipartUpload, MultipartStore};
pub use object::{CopyOverrides, ObjectStore, PutObjectRequest};

// ---------------------------------------------------------------------------
// On-disk file names
// ---------------------------------------------------------------------------

pub(crate) const BUCKET_META_FILE: &str = "bucket.json";
pub(crate) const OBJECT_META_FILE: &str = "metadata.json";
pub(crate) const PAYLOAD_FILE: &str = "payload";
pub(crate) const VERSION_CHAIN_FILE: &str = "versions.json";
pub(crate) const MULTIPARTS_DIR: &str = "multiparts";
pub(crate) const UPLOAD_META_FILE: &str = "upload.json";
pub(crate) const PART_SUFFIX: &str = ".part";

// ---------------------------------------------------------------------------
// JSON persistence helpers
// ---------------------------------------------------------------------------

/// Serialize `value` as pretty JSON and write it to `path`.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let data = serde_json::to_vec_pretty(value).map_err(|e| StoreError::metadata(path, e))?;
    fs::write(path, data).map_err(|e| StoreError::io(path, e))
}

/// Read and deserialize a JSON file, returning `Ok(None)` when it is absent.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let value = serde_json::from_slice(&data).map_err(|e| StoreError::metadata(path, e))?;
    Ok(Some(value))
}
