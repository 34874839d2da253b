//! The storage engine facade.
//!
//! [`FileStore`] owns the storage root, the shared lock registries, and the
//! three stores. Opening with no configured root uses a temporary directory
//! that lives exactly as long as the handle unless `retain_files` is set.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::locks::StoreLocks;
use crate::store::{BucketStore, MultipartStore, ObjectStore};

/// The file-backed storage engine.
///
/// Cheap to share by reference across request-handling threads; all
/// synchronization is per-entity inside the stores.
pub struct FileStore {
    config: StoreConfig,
    root: PathBuf,
    buckets: BucketStore,
    objects: ObjectStore,
    multiparts: MultipartStore,
    // Holds the ephemeral root alive; dropping it removes the files.
    _temp_root: Option<tempfile::TempDir>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Open a store per `config`, creating the root and any initial buckets.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let (root, temp_root) = match &config.root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| StoreError::io(root, e))?;
                (root.clone(), None)
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("mocks3-")
                    .tempdir()
                    .map_err(|e| StoreError::io(std::env::temp_dir(), e))?;
                if config.retain_files {
                    let path = temp.keep();
                    (path, None)
                } else {
                    (temp.path().to_path_buf(), Some(temp))
                }
            }
        };

        let locks = Arc::new(StoreLocks::new());
        let objects = ObjectStore::new(locks.clone());
        let store = Self {
            buckets: BucketStore::new(root.clone(), locks.clone()),
            multiparts: MultipartStore::new(locks, objects.clone()),
            objects,
            root,
            config,
            _temp_root: temp_root,
        };

        for bucket in &store.config.initial_buckets {
            if !store.buckets.bucket_exists(bucket)? {
                store.buckets.create_bucket(
                    bucket,
                    &store.config.region,
                    "BucketOwnerEnforced",
                    false,
                    None,
                )?;
            }
        }
        info!(root = %store.root.display(), "opened file store");
        Ok(store)
    }

    /// The bucket store.
    #[must_use]
    pub fn bucket_store(&self) -> &BucketStore {
        &self.buckets
    }

    /// The object store.
    #[must_use]
    pub fn object_store(&self) -> &ObjectStore {
        &self.objects
    }

    /// The multipart store.
    #[must_use]
    pub fn multipart_store(&self) -> &MultipartStore {
        &self.multiparts
    }

    /// The storage root all bucket folders live under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
