//! Bucket store: bucket lifecycle, configuration, and the key index.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::locks::StoreLocks;
use crate::meta::bucket::{BucketMetadata, ObjectLockConfiguration, VersioningStatus};

use super::{BUCKET_META_FILE, read_json, write_json};

/// Manages bucket folders under the storage root.
///
/// Every mutation takes the bucket's monitor, reloads the metadata file,
/// applies the change, and rewrites the file, so concurrent mutators of one
/// bucket always see each other's writes.
#[derive(Debug, Clone)]
pub struct BucketStore {
    root: PathBuf,
    locks: Arc<StoreLocks>,
}

impl BucketStore {
    /// Create a bucket store rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf, locks: Arc<StoreLocks>) -> Self {
        Self { root, locks }
    }

    /// The storage root all bucket folders live under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn meta_path(&self, bucket: &str) -> PathBuf {
        self.bucket_dir(bucket).join(BUCKET_META_FILE)
    }

    // -----------------------------------------------------------------------
    // Bucket lifecycle
    // -----------------------------------------------------------------------

    /// Create a bucket folder and its metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BucketAlreadyExists`] when the bucket exists.
    pub fn create_bucket(
        &self,
        bucket: &str,
        region: &str,
        ownership: &str,
        object_lock_enabled: bool,
        bucket_info: Option<serde_json::Value>,
    ) -> StoreResult<BucketMetadata> {
        let lock = self.locks.buckets.acquire(bucket.to_owned());
        let _guard = lock.lock();

        let dir = self.bucket_dir(bucket);
        if dir.exists() {
            return Err(StoreError::BucketAlreadyExists {
                bucket: bucket.to_owned(),
            });
        }
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let meta = BucketMetadata::new(
            bucket,
            region,
            ownership,
            object_lock_enabled,
            bucket_info,
            dir,
        );
        write_json(&self.meta_path(bucket), &meta)?;
        debug!(bucket, region, "created bucket");
        Ok(meta)
    }

    /// Delete a bucket if it exists and holds no keys.
    ///
    /// Returns `false` when the bucket is absent or still holds keys; the
    /// emptiness check runs under the bucket's monitor, so an external check
    /// cannot race a concurrent key binding.
    pub fn delete_bucket(&self, bucket: &str) -> StoreResult<bool> {
        let lock = self.locks.buckets.acquire(bucket.to_owned());
        {
            let _guard = lock.lock();

            let Some(meta) = read_json::<BucketMetadata>(&self.meta_path(bucket))? else {
                return Ok(false);
            };
            if !meta.objects.is_empty() {
                debug!(bucket, keys = meta.objects.len(), "refusing non-empty bucket delete");
                return Ok(false);
            }

            let dir = self.bucket_dir(bucket);
            fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
            debug!(bucket, "deleted bucket");
        }
        // Drop our strong reference before asking the registry to forget the
        // monitor; a racing acquirer keeps the entry alive.
        drop(lock);
        self.locks.buckets.release(&bucket.to_owned());
        Ok(true)
    }

    /// Load a bucket's metadata, or `None` when it does not exist.
    pub fn get_bucket_metadata(&self, bucket: &str) -> StoreResult<Option<BucketMetadata>> {
        read_json(&self.meta_path(bucket))
    }

    /// Whether a bucket exists.
    pub fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(self.meta_path(bucket).exists())
    }

    /// Metadata of all buckets under the root, sorted by name.
    pub fn list_buckets(&self) -> StoreResult<Vec<BucketMetadata>> {
        let mut buckets = Vec::new();
        if !self.root.exists() {
            return Ok(buckets);
        }
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let meta_path = entry.path().join(BUCKET_META_FILE);
            if let Some(meta) = read_json::<BucketMetadata>(&meta_path)? {
                buckets.push(meta);
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    // -----------------------------------------------------------------------
    // Key index
    // -----------------------------------------------------------------------

    /// Find or mint the stable identifier bound to `key`.
    ///
    /// Idempotent: an already-indexed key returns its existing identifier
    /// unchanged. Minting a fresh identifier registers its monitor as a side
    /// effect, so every identifier visible in an index already has a lock.
    pub fn add_key_to_bucket(&self, bucket: &str, key: &str) -> StoreResult<Uuid> {
        let lock = self.locks.buckets.acquire(bucket.to_owned());
        let _guard = lock.lock();

        let path = self.meta_path(bucket);
        let Some(mut meta) = read_json::<BucketMetadata>(&path)? else {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "bucket {bucket} does not exist"
            )));
        };
        if let Some(id) = meta.objects.get(key) {
            return Ok(*id);
        }

        let id = Uuid::new_v4();
        self.locks.objects.register(id);
        meta.objects.insert(key.to_owned(), id);
        write_json(&path, &meta)?;
        trace!(bucket, key, %id, "bound key");
        Ok(id)
    }

    /// Remove a key from the bucket's index. Returns whether it was bound.
    pub fn remove_from_bucket(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let mut removed = false;
        self.with_bucket_mut(bucket, |meta| {
            removed = meta.objects.remove(key).is_some();
        })?;
        Ok(removed)
    }

    /// Identifiers of all keys matching `prefix` (all keys when `None`).
    pub fn lookup_keys_in_bucket(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<Uuid>> {
        let Some(meta) = self.get_bucket_metadata(bucket)? else {
            return Ok(Vec::new());
        };
        Ok(meta.matching_ids(prefix))
    }

    // -----------------------------------------------------------------------
    // Bucket configuration
    // -----------------------------------------------------------------------

    /// Replace the bucket's versioning status.
    pub fn store_versioning_configuration(
        &self,
        bucket: &str,
        status: VersioningStatus,
    ) -> StoreResult<()> {
        self.with_bucket_mut(bucket, |meta| {
            meta.versioning = Some(status);
        })
    }

    /// Replace the bucket's Object Lock configuration.
    pub fn store_object_lock_configuration(
        &self,
        bucket: &str,
        config: ObjectLockConfiguration,
    ) -> StoreResult<()> {
        self.with_bucket_mut(bucket, |meta| {
            meta.object_lock_configuration = Some(config);
        })
    }

    /// Replace or clear the bucket's lifecycle configuration.
    pub fn store_bucket_lifecycle_configuration(
        &self,
        bucket: &str,
        config: Option<serde_json::Value>,
    ) -> StoreResult<()> {
        self.with_bucket_mut(bucket, |meta| {
            meta.lifecycle_configuration = config;
        })
    }

    /// Load, mutate, and rewrite a bucket's metadata under its monitor.
    fn with_bucket_mut(
        &self,
        bucket: &str,
        mutate: impl FnOnce(&mut BucketMetadata),
    ) -> StoreResult<()> {
        let lock = self.locks.buckets.acquire(bucket.to_owned());
        let _guard = lock.lock();

        let path = self.meta_path(bucket);
        let Some(mut meta) = read_json::<BucketMetadata>(&path)? else {
            return Err(StoreError::Internal(anyhow::anyhow!(
                "bucket {bucket} does not exist"
            )));
        };
        mutate(&mut meta);
        write_json(&path, &meta)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
