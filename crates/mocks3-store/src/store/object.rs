//! Object store: payload persistence, version chains, and object metadata.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, salted_file_digest};
use crate::error::{StoreError, StoreResult};
use crate::locks::StoreLocks;
use crate::meta::bucket::BucketMetadata;
use crate::meta::object::{
    AccessControlPolicy, LegalHold, ObjectMeta, Owner, Retention, Tag, VersionChain,
};

use super::{OBJECT_META_FILE, PAYLOAD_FILE, VERSION_CHAIN_FILE, read_json, write_json};

/// Header naming the server-side encryption scheme, carried verbatim.
pub const ENCRYPTION_HEADER: &str = "x-amz-server-side-encryption";
/// Header naming the KMS key; its value salts the payload digest so that
/// the same bytes written under different keys produce different ETags.
pub const KMS_KEY_HEADER: &str = "x-amz-server-side-encryption-aws-kms-key-id";

fn kms_key(encryption_headers: &HashMap<String, String>) -> Option<&str> {
    encryption_headers.get(KMS_KEY_HEADER).map(String::as_str)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything a caller supplies alongside the payload when storing an object.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PutObjectRequest {
    /// Key the object is stored under.
    #[builder(setter(into))]
    pub key: String,
    /// Content type to record.
    #[builder(default)]
    pub content_type: Option<String>,
    /// Protocol headers to carry verbatim.
    #[builder(default)]
    pub store_headers: HashMap<String, String>,
    /// User metadata to carry verbatim.
    #[builder(default)]
    pub user_metadata: HashMap<String, String>,
    /// Encryption headers to carry verbatim.
    #[builder(default)]
    pub encryption_headers: HashMap<String, String>,
    /// Precomputed ETag; when `None` the store digests the payload itself.
    #[builder(default)]
    pub etag: Option<String>,
    /// Tags to record.
    #[builder(default)]
    pub tags: Vec<Tag>,
    /// Algorithm of the supplied checksum.
    #[builder(default)]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Checksum to record.
    #[builder(default)]
    pub checksum: Option<String>,
    /// Owner to record.
    #[builder(default)]
    pub owner: Owner,
    /// Storage class to record.
    #[builder(default = String::from("STANDARD"))]
    pub storage_class: String,
}

/// Attribute replacements applied during a copy.
///
/// An empty override set on a same-key copy is rejected, matching the
/// protocol rule that a copy onto itself must change something.
#[derive(Debug, Clone, Default)]
pub struct CopyOverrides {
    /// Replace the user metadata.
    pub user_metadata: Option<HashMap<String, String>>,
    /// Replace the storage class.
    pub storage_class: Option<String>,
    /// Replace the carried protocol headers.
    pub store_headers: Option<HashMap<String, String>>,
    /// Replace the encryption headers. Forces an ETag recomputation since
    /// the digest salt may change.
    pub encryption_headers: Option<HashMap<String, String>>,
}

impl CopyOverrides {
    /// Whether no attribute is replaced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user_metadata.is_none()
            && self.storage_class.is_none()
            && self.store_headers.is_none()
            && self.encryption_headers.is_none()
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Stores object payloads and metadata inside bucket folders.
///
/// An object folder is named by the object's identifier. Unversioned state
/// is the `metadata.json`/`payload` pair; versioned state is a
/// `versions.json` chain plus one version-prefixed pair per version.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    locks: Arc<StoreLocks>,
}

impl ObjectStore {
    /// Create an object store sharing the engine's lock registries.
    #[must_use]
    pub fn new(locks: Arc<StoreLocks>) -> Self {
        Self { locks }
    }

    // -----------------------------------------------------------------------
    // Write
    // -----------------------------------------------------------------------

    /// Store the payload at `source` under `id` in `bucket`.
    ///
    /// When the bucket has versioning enabled a new version is minted and
    /// appended to the identifier's chain; otherwise the unversioned pair is
    /// overwritten in place. Returns the metadata that was persisted.
    pub fn store_object(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        source: &Path,
        request: PutObjectRequest,
    ) -> StoreResult<ObjectMeta> {
        let lock = self.locks.objects.acquire(id);
        let _guard = lock.lock();

        let dir = bucket.object_path(id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let version_id = if bucket.is_versioning_enabled() {
            let chain_path = dir.join(VERSION_CHAIN_FILE);
            let mut chain =
                read_json::<VersionChain>(&chain_path)?.unwrap_or_else(|| VersionChain::new(id));
            let version_id = chain.create_version();
            write_json(&chain_path, &chain)?;
            Some(version_id)
        } else {
            None
        };

        let (meta_path, payload_path) = entity_paths(&dir, version_id.as_deref());
        if source != payload_path {
            fs::copy(source, &payload_path).map_err(|e| StoreError::io(&payload_path, e))?;
        }
        let size = fs::metadata(&payload_path)
            .map_err(|e| StoreError::io(&payload_path, e))?
            .len();

        let etag = match request.etag {
            Some(etag) => etag,
            None => salted_file_digest(kms_key(&request.encryption_headers), &payload_path)?,
        };

        let meta = ObjectMeta {
            id,
            key: request.key,
            size,
            etag,
            content_type: request.content_type,
            modification_date: Utc::now(),
            data_path: payload_path,
            user_metadata: request.user_metadata,
            tags: request.tags,
            legal_hold: None,
            retention: None,
            owner: request.owner,
            store_headers: request.store_headers,
            encryption_headers: request.encryption_headers,
            checksum: request.checksum,
            checksum_algorithm: request.checksum_algorithm,
            storage_class: request.storage_class,
            version_id,
            delete_marker: false,
            acl: None,
        };
        write_json(&meta_path, &meta)?;
        debug!(bucket = %bucket.name, key = %meta.key, %id, size, "stored object");
        Ok(meta)
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Load an object's metadata.
    ///
    /// With `version_id` set, loads exactly that version; otherwise resolves
    /// the current state, which may be a delete marker. Returns `Ok(None)`
    /// for unknown identifiers and versions.
    pub fn get_object(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
    ) -> StoreResult<Option<ObjectMeta>> {
        let dir = bucket.object_path(id);
        if !dir.exists() {
            return Ok(None);
        }
        Ok(load_current(&dir, version_id)?.map(|(_, meta)| meta))
    }

    /// The version chain of an identifier, or `None` when it was never
    /// versioned.
    pub fn get_version_chain(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
    ) -> StoreResult<Option<VersionChain>> {
        read_json(&bucket.object_path(id).join(VERSION_CHAIN_FILE))
    }

    // -----------------------------------------------------------------------
    // Copy
    // -----------------------------------------------------------------------

    /// Copy an object (or one version of it) to a destination key.
    ///
    /// Attributes are inherited from the source except where `overrides`
    /// replaces them. Returns `Ok(None)` when the source does not exist or
    /// resolves to a delete marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCopy`] for a same-key copy that changes
    /// nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_object(
        &self,
        src_bucket: &BucketMetadata,
        src_id: Uuid,
        src_version: Option<&str>,
        dst_bucket: &BucketMetadata,
        dst_id: Uuid,
        dst_key: &str,
        overrides: CopyOverrides,
    ) -> StoreResult<Option<ObjectMeta>> {
        let Some(source) = self.get_object(src_bucket, src_id, src_version)? else {
            return Ok(None);
        };
        if source.delete_marker {
            return Ok(None);
        }

        let same_target = src_bucket.name == dst_bucket.name && source.key == dst_key;
        if same_target && overrides.is_empty() {
            return Err(StoreError::InvalidCopy {
                bucket: dst_bucket.name.clone(),
                key: dst_key.to_owned(),
            });
        }

        // A changed digest salt invalidates the inherited ETag.
        let etag = if overrides.encryption_headers.is_some() {
            None
        } else {
            Some(source.etag.clone())
        };

        let request = PutObjectRequest::builder()
            .key(dst_key)
            .content_type(source.content_type.clone())
            .store_headers(overrides.store_headers.unwrap_or(source.store_headers))
            .user_metadata(overrides.user_metadata.unwrap_or(source.user_metadata))
            .encryption_headers(
                overrides
                    .encryption_headers
                    .unwrap_or(source.encryption_headers),
            )
            .etag(etag)
            .tags(source.tags)
            .checksum_algorithm(source.checksum_algorithm)
            .checksum(source.checksum)
            .owner(source.owner)
            .storage_class(overrides.storage_class.unwrap_or(source.storage_class))
            .build();

        let meta = self.store_object(dst_bucket, dst_id, &source.data_path, request)?;
        trace!(
            from = %src_bucket.name, to = %dst_bucket.name, key = dst_key,
            "copied object"
        );
        Ok(Some(meta))
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete an object or one of its versions.
    ///
    /// Without a version: a versioning-enabled bucket gets a delete marker
    /// appended to the chain; otherwise the whole object folder is removed
    /// and the identifier's monitor released. With a version: that version's
    /// files are removed from disk and the chain; removing the last version
    /// removes the folder too.
    ///
    /// Returns `false` when the identifier or the named version is unknown.
    /// Callers unbind the key from the bucket index when the return value
    /// and the bucket's versioning mode call for it.
    pub fn delete_object(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
    ) -> StoreResult<bool> {
        let lock = self.locks.objects.acquire(id);
        let mut folder_removed = false;
        {
            let _guard = lock.lock();

            // Checked under the monitor so a delete racing another delete
            // observes the folder's removal instead of tripping over it.
            let dir = bucket.object_path(id);
            if !dir.exists() {
                return Ok(false);
            }

            match version_id {
                Some(version) => {
                    let chain_path = dir.join(VERSION_CHAIN_FILE);
                    let Some(mut chain) = read_json::<VersionChain>(&chain_path)? else {
                        return Ok(false);
                    };
                    if !chain.remove_version(version) {
                        return Ok(false);
                    }
                    let (meta_path, payload_path) = entity_paths(&dir, Some(version));
                    remove_file_if_present(&meta_path)?;
                    remove_file_if_present(&payload_path)?;

                    if chain.is_empty() && !dir.join(OBJECT_META_FILE).exists() {
                        fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
                        folder_removed = true;
                    } else {
                        write_json(&chain_path, &chain)?;
                    }
                    debug!(bucket = %bucket.name, %id, version, "deleted object version");
                }
                None if bucket.is_versioning_enabled() => {
                    let chain_path = dir.join(VERSION_CHAIN_FILE);
                    let mut chain = read_json::<VersionChain>(&chain_path)?
                        .unwrap_or_else(|| VersionChain::new(id));
                    let version = chain.create_version();
                    write_json(&chain_path, &chain)?;

                    let (meta_path, payload_path) = entity_paths(&dir, Some(version.as_str()));
                    fs::write(&payload_path, []).map_err(|e| StoreError::io(&payload_path, e))?;
                    let marker = ObjectMeta {
                        id,
                        key: String::new(),
                        size: 0,
                        etag: salted_file_digest(None, &payload_path)?,
                        content_type: None,
                        modification_date: Utc::now(),
                        data_path: payload_path,
                        user_metadata: HashMap::new(),
                        tags: Vec::new(),
                        legal_hold: None,
                        retention: None,
                        owner: Owner::default(),
                        store_headers: HashMap::new(),
                        encryption_headers: HashMap::new(),
                        checksum: None,
                        checksum_algorithm: None,
                        storage_class: "STANDARD".to_owned(),
                        version_id: Some(version.clone()),
                        delete_marker: true,
                        acl: None,
                    };
                    write_json(&meta_path, &marker)?;
                    debug!(bucket = %bucket.name, %id, version, "wrote delete marker");
                }
                None => {
                    fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
                    folder_removed = true;
                    debug!(bucket = %bucket.name, %id, "deleted object");
                }
            }
        }
        if folder_removed {
            drop(lock);
            self.locks.objects.release(&id);
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Metadata setters
    // -----------------------------------------------------------------------

    /// Replace an object's tag set. Returns whether the object was found.
    pub fn store_object_tags(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
        tags: Vec<Tag>,
    ) -> StoreResult<bool> {
        self.update_meta(bucket, id, version_id, |meta| meta.tags = tags)
    }

    /// Set an object's legal hold. Returns whether the object was found.
    pub fn store_legal_hold(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
        hold: LegalHold,
    ) -> StoreResult<bool> {
        self.update_meta(bucket, id, version_id, |meta| meta.legal_hold = Some(hold))
    }

    /// Set an object's retention. Returns whether the object was found.
    pub fn store_retention(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
        retention: Retention,
    ) -> StoreResult<bool> {
        self.update_meta(bucket, id, version_id, |meta| {
            meta.retention = Some(retention);
        })
    }

    /// Set an object's access control policy. Returns whether the object was
    /// found.
    pub fn store_acl(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
        acl: AccessControlPolicy,
    ) -> StoreResult<bool> {
        self.update_meta(bucket, id, version_id, |meta| meta.acl = Some(acl))
    }

    /// Load, mutate, and rewrite one metadata record under the object's
    /// monitor.
    fn update_meta(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        version_id: Option<&str>,
        mutate: impl FnOnce(&mut ObjectMeta),
    ) -> StoreResult<bool> {
        let lock = self.locks.objects.acquire(id);
        let _guard = lock.lock();

        let dir = bucket.object_path(id);
        if !dir.exists() {
            return Ok(false);
        }
        let Some((path, mut meta)) = load_current(&dir, version_id)? else {
            return Ok(false);
        };
        mutate(&mut meta);
        write_json(&path, &meta)?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Metadata and payload paths of one stored entity, version-prefixed when a
/// version is named.
fn entity_paths(dir: &Path, version_id: Option<&str>) -> (PathBuf, PathBuf) {
    match version_id {
        Some(vid) => (
            dir.join(format!("{vid}-{OBJECT_META_FILE}")),
            dir.join(format!("{vid}-{PAYLOAD_FILE}")),
        ),
        None => (dir.join(OBJECT_META_FILE), dir.join(PAYLOAD_FILE)),
    }
}

/// Resolve the metadata record a read addresses.
///
/// A named version resolves directly. Otherwise the newer of the chain's
/// latest version and the unversioned pair wins; both can exist when a
/// bucket's versioning was toggled over the object's lifetime.
fn load_current(
    dir: &Path,
    version_id: Option<&str>,
) -> StoreResult<Option<(PathBuf, ObjectMeta)>> {
    if version_id.is_some() {
        let (meta_path, _) = entity_paths(dir, version_id);
        return Ok(read_json::<ObjectMeta>(&meta_path)?.map(|meta| (meta_path, meta)));
    }

    let chain: Option<VersionChain> = read_json(&dir.join(VERSION_CHAIN_FILE))?;
    let latest = chain.as_ref().and_then(VersionChain::latest);
    let versioned = match latest {
        Some(vid) => {
            let (meta_path, _) = entity_paths(dir, Some(vid));
            read_json::<ObjectMeta>(&meta_path)?.map(|meta| (meta_path, meta))
        }
        None => None,
    };

    let unversioned_path = dir.join(OBJECT_META_FILE);
    let unversioned =
        read_json::<ObjectMeta>(&unversioned_path)?.map(|meta| (unversioned_path, meta));

    Ok(match (versioned, unversioned) {
        (Some(v), Some(u)) => {
            if v.1.modification_date >= u.1.modification_date {
                Some(v)
            } else {
                Some(u)
            }
        }
        (v, u) => v.or(u),
    })
}

fn remove_file_if_present(path: &Path) -> StoreResult<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
