//! Multipart store: upload lifecycle, part payloads, and assembly.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::checksums::{
    ChecksumAlgorithm, ChecksumType, composite_checksum, file_checksum, file_digest,
    full_object_checksum, multipart_etag, salted_file_digest,
};
use crate::error::{StoreError, StoreResult};
use crate::locks::StoreLocks;
use crate::meta::bucket::BucketMetadata;
use crate::meta::multipart::{MultipartUpload, StoredPart};
use crate::meta::object::{ObjectMeta, Owner, Tag};

use super::object::{KMS_KEY_HEADER, ObjectStore, PutObjectRequest};
use super::{PART_SUFFIX, UPLOAD_META_FILE, read_json, write_json};

const MAX_PART_NUMBER: u16 = 10_000;

/// Everything a caller supplies when creating a multipart upload.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateMultipartUpload {
    /// Key the assembled object will be stored under.
    #[builder(setter(into))]
    pub key: String,
    /// Content type of the assembled object.
    #[builder(default)]
    pub content_type: Option<String>,
    /// Storage class of the assembled object.
    #[builder(default = String::from("STANDARD"))]
    pub storage_class: String,
    /// Checksum algorithm parts will be checked against.
    #[builder(default)]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// How the final checksum spans the parts.
    #[builder(default)]
    pub checksum_type: Option<ChecksumType>,
    /// Protocol headers carried through to the assembled object.
    #[builder(default)]
    pub store_headers: HashMap<String, String>,
    /// User metadata carried through to the assembled object.
    #[builder(default)]
    pub user_metadata: HashMap<String, String>,
    /// Encryption headers carried through to the assembled object.
    #[builder(default)]
    pub encryption_headers: HashMap<String, String>,
    /// Tags carried through to the assembled object.
    #[builder(default)]
    pub tags: Vec<Tag>,
    /// Owner of the assembled object.
    #[builder(default)]
    pub owner: Owner,
    /// Who initiates the upload.
    #[builder(default)]
    pub initiator: Owner,
}

/// The outcome of a successful completion.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    /// Metadata of the assembled object.
    pub object: ObjectMeta,
    /// Assembled ETag: digest of the concatenated raw part digests, with a
    /// `-{count}` suffix.
    pub etag: String,
    /// Whole-object checksum, when the upload declared an algorithm.
    pub checksum: Option<String>,
}

// ---------------------------------------------------------------------------
// MultipartStore
// ---------------------------------------------------------------------------

/// Stores in-flight multipart uploads inside a bucket's `multiparts` folder.
///
/// Part writes and aborts are serialized per upload. Completion itself runs
/// without the upload's monitor so a slow assembly cannot stall part
/// bookkeeping of other callers; a caller racing completion against its own
/// abort gets whichever finishes first.
#[derive(Debug, Clone)]
pub struct MultipartStore {
    locks: Arc<StoreLocks>,
    objects: ObjectStore,
}

impl MultipartStore {
    /// Create a multipart store sharing the engine's lock registries.
    #[must_use]
    pub fn new(locks: Arc<StoreLocks>, objects: ObjectStore) -> Self {
        Self { locks, objects }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a multipart upload and its parts folder.
    ///
    /// Minting the upload identifier registers its monitor as a side effect,
    /// so every identifier handed out has a lock.
    pub fn create_multipart_upload(
        &self,
        bucket: &BucketMetadata,
        request: CreateMultipartUpload,
    ) -> StoreResult<MultipartUpload> {
        let upload_id = Uuid::new_v4();
        self.locks.uploads.register(upload_id);

        let dir = bucket.upload_path(upload_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let upload = MultipartUpload {
            upload_id,
            bucket: bucket.name.clone(),
            key: request.key,
            initiated: Utc::now(),
            owner: request.owner,
            initiator: request.initiator,
            storage_class: request.storage_class,
            checksum_algorithm: request.checksum_algorithm,
            checksum_type: request.checksum_type,
            content_type: request.content_type,
            store_headers: request.store_headers,
            user_metadata: request.user_metadata,
            encryption_headers: request.encryption_headers,
            tags: request.tags,
            completed: false,
            part_checksums: std::collections::BTreeMap::new(),
        };
        write_json(&dir.join(UPLOAD_META_FILE), &upload)?;
        debug!(bucket = %bucket.name, key = %upload.key, %upload_id, "created multipart upload");
        Ok(upload)
    }

    /// Abort an upload, deleting its parts folder.
    ///
    /// Unknown or already-removed uploads are a no-op returning `false`.
    pub fn abort_multipart_upload(
        &self,
        bucket: &BucketMetadata,
        upload_id: Uuid,
    ) -> StoreResult<bool> {
        let lock = self.locks.uploads.acquire(upload_id);
        {
            let _guard = lock.lock();

            let dir = bucket.upload_path(upload_id);
            if !dir.join(UPLOAD_META_FILE).exists() {
                return Ok(false);
            }
            fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
            debug!(bucket = %bucket.name, %upload_id, "aborted multipart upload");
        }
        drop(lock);
        self.locks.uploads.release(&upload_id);
        Ok(true)
    }

    /// Load an upload's record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchUpload`] for unknown identifiers.
    pub fn get_multipart_upload(
        &self,
        bucket: &BucketMetadata,
        upload_id: Uuid,
    ) -> StoreResult<MultipartUpload> {
        read_json(&bucket.upload_path(upload_id).join(UPLOAD_META_FILE))?.ok_or_else(|| {
            StoreError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            }
        })
    }

    /// In-flight uploads of a bucket whose key matches `prefix`, ordered by
    /// key then initiation time.
    pub fn list_multipart_uploads(
        &self,
        bucket: &BucketMetadata,
        prefix: Option<&str>,
    ) -> StoreResult<Vec<MultipartUpload>> {
        let dir = bucket.multiparts_path();
        let mut uploads = Vec::new();
        if !dir.exists() {
            return Ok(uploads);
        }
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let Some(upload) =
                read_json::<MultipartUpload>(&entry.path().join(UPLOAD_META_FILE))?
            else {
                continue;
            };
            if prefix.is_none_or(|p| upload.key.starts_with(p)) {
                uploads.push(upload);
            }
        }
        uploads.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.initiated.cmp(&b.initiated))
        });
        Ok(uploads)
    }

    // -----------------------------------------------------------------------
    // Parts
    // -----------------------------------------------------------------------

    /// Store the payload at `source` as one part of an upload.
    ///
    /// Returns the part's digest (salted with the upload's KMS key when
    /// present), which doubles as the part's ETag. When the upload declared
    /// a checksum algorithm the part's checksum is computed, verified
    /// against `checksum` if supplied, and recorded for completion.
    ///
    /// The payload is staged and verified before it replaces the part file,
    /// so a rejected write leaves a previously stored part untouched.
    pub fn put_part(
        &self,
        bucket: &BucketMetadata,
        upload_id: Uuid,
        part_number: u16,
        source: &Path,
        checksum: Option<&str>,
    ) -> StoreResult<String> {
        validate_part_number(part_number)?;

        let lock = self.locks.uploads.acquire(upload_id);
        let _guard = lock.lock();

        let dir = bucket.upload_path(upload_id);
        let meta_path = dir.join(UPLOAD_META_FILE);
        let Some(mut upload) = read_json::<MultipartUpload>(&meta_path)? else {
            return Err(StoreError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            });
        };

        let staging = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        fs::copy(source, staging.path()).map_err(|e| StoreError::io(staging.path(), e))?;

        let computed = match upload.checksum_algorithm {
            Some(algorithm) => {
                let computed = file_checksum(algorithm, staging.path())?;
                if let Some(expected) = checksum {
                    if expected != computed {
                        return Err(StoreError::ChecksumMismatch {
                            algorithm,
                            expected: expected.to_owned(),
                            computed,
                        });
                    }
                }
                Some(computed)
            }
            None => None,
        };

        let part_path = part_path(&dir, part_number);
        staging
            .persist(&part_path)
            .map_err(|e| StoreError::io(&part_path, e.error))?;
        if let Some(computed) = computed {
            upload.part_checksums.insert(part_number, computed);
            write_json(&meta_path, &upload)?;
        }

        let salt = upload.encryption_headers.get(KMS_KEY_HEADER);
        salted_file_digest(salt.map(String::as_str), &part_path)
    }

    /// Store one part by copying an existing object's payload, optionally a
    /// byte range of it.
    ///
    /// Returns `Ok(None)` when the source object does not exist or resolves
    /// to a delete marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UploadNotPrepared`] when the upload's parts
    /// folder is missing.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_part(
        &self,
        src_bucket: &BucketMetadata,
        src_id: Uuid,
        src_version: Option<&str>,
        range: Option<(u64, u64)>,
        dst_bucket: &BucketMetadata,
        upload_id: Uuid,
        part_number: u16,
    ) -> StoreResult<Option<String>> {
        validate_part_number(part_number)?;

        let dir = dst_bucket.upload_path(upload_id);
        if !dir.exists() {
            return Err(StoreError::UploadNotPrepared {
                upload_id: upload_id.to_string(),
            });
        }
        let Some(source) = self.objects.get_object(src_bucket, src_id, src_version)? else {
            return Ok(None);
        };
        if source.delete_marker {
            return Ok(None);
        }

        let lock = self.locks.uploads.acquire(upload_id);
        let _guard = lock.lock();

        let meta_path = dir.join(UPLOAD_META_FILE);
        let upload: Option<MultipartUpload> = read_json(&meta_path)?;
        let Some(mut upload) = upload else {
            return Err(StoreError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            });
        };

        let part_path = part_path(&dir, part_number);
        match range {
            Some((start, end)) => {
                let mut reader =
                    fs::File::open(&source.data_path).map_err(|e| StoreError::io(&source.data_path, e))?;
                reader
                    .seek(SeekFrom::Start(start))
                    .map_err(|e| StoreError::io(&source.data_path, e))?;
                let mut limited = reader.take(end.saturating_sub(start) + 1);
                let mut writer =
                    fs::File::create(&part_path).map_err(|e| StoreError::io(&part_path, e))?;
                io::copy(&mut limited, &mut writer).map_err(|e| StoreError::io(&part_path, e))?;
            }
            None => {
                fs::copy(&source.data_path, &part_path)
                    .map_err(|e| StoreError::io(&part_path, e))?;
            }
        }

        // Copied parts take part in checksum validation at completion the
        // same way uploaded parts do.
        if let Some(algorithm) = upload.checksum_algorithm {
            let computed = file_checksum(algorithm, &part_path)?;
            upload.part_checksums.insert(part_number, computed);
            write_json(&meta_path, &upload)?;
        }

        let salt = upload.encryption_headers.get(KMS_KEY_HEADER);
        let digest = salted_file_digest(salt.map(String::as_str), &part_path)?;
        Ok(Some(digest))
    }

    /// Parts currently on disk for an upload, ordered by part number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchUpload`] for unknown identifiers.
    pub fn list_parts(
        &self,
        bucket: &BucketMetadata,
        upload_id: Uuid,
    ) -> StoreResult<Vec<StoredPart>> {
        let dir = bucket.upload_path(upload_id);
        if !dir.join(UPLOAD_META_FILE).exists() {
            return Err(StoreError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            });
        }

        let mut parts = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();
            let Some(part_number) = parse_part_number(&path) else {
                continue;
            };
            let stat = fs::metadata(&path).map_err(|e| StoreError::io(&path, e))?;
            let last_modified = stat
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            parts.push(StoredPart {
                part_number,
                etag: file_digest(&path)?,
                size: stat.len(),
                last_modified,
            });
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Assemble the named parts into the final object.
    ///
    /// Parts are concatenated in the given order into a temporary file that
    /// becomes the object payload under `id`. The object's ETag is the
    /// multipart form; when the upload declared a checksum algorithm the
    /// whole-object checksum is computed per the declared checksum type and
    /// verified against `checksum` if supplied. The parts folder is removed
    /// on success and the upload's monitor is released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoSuchUpload`] for unknown uploads,
    /// [`StoreError::InvalidPart`] for missing or misordered part numbers,
    /// [`StoreError::MissingPartChecksum`] when a declared algorithm has no
    /// recorded checksum for a part, and [`StoreError::ChecksumMismatch`]
    /// when a supplied checksum disagrees with the computed one.
    pub fn complete_multipart_upload(
        &self,
        bucket: &BucketMetadata,
        id: Uuid,
        upload_id: Uuid,
        part_numbers: &[u16],
        checksum: Option<&str>,
    ) -> StoreResult<CompletedUpload> {
        let dir = bucket.upload_path(upload_id);
        let meta_path = dir.join(UPLOAD_META_FILE);
        let Some(mut upload) = read_json::<MultipartUpload>(&meta_path)? else {
            return Err(StoreError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            });
        };

        let part_paths = resolve_parts(&dir, part_numbers)?;

        // Concatenate into a staging file beside the bucket's objects so the
        // final copy stays on one filesystem.
        let staging = tempfile::NamedTempFile::new_in(&bucket.path)
            .map_err(|e| StoreError::io(&bucket.path, e))?;
        let mut writer = staging.as_file();
        let mut part_digests = Vec::with_capacity(part_paths.len());
        for path in &part_paths {
            part_digests.push(file_digest(path)?);
            let mut reader = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
            io::copy(&mut reader, &mut writer).map_err(|e| StoreError::io(path, e))?;
        }
        let etag = multipart_etag(&part_digests);

        let object_checksum = match upload.checksum_algorithm {
            Some(algorithm) => Some(assemble_checksum(
                algorithm,
                upload.checksum_type.unwrap_or_default(),
                &upload,
                part_numbers,
                &part_paths,
                checksum,
            )?),
            None => None,
        };

        let request = PutObjectRequest::builder()
            .key(upload.key.clone())
            .content_type(upload.content_type.clone())
            .store_headers(upload.store_headers.clone())
            .user_metadata(upload.user_metadata.clone())
            .encryption_headers(upload.encryption_headers.clone())
            .etag(Some(etag.clone()))
            .tags(upload.tags.clone())
            .checksum_algorithm(upload.checksum_algorithm)
            .checksum(object_checksum.clone())
            .owner(upload.owner.clone())
            .storage_class(upload.storage_class.clone())
            .build();
        let object = self
            .objects
            .store_object(bucket, id, staging.path(), request)?;

        upload.completed = true;
        write_json(&meta_path, &upload)?;
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(%upload_id, error = %e, "leaving parts folder behind");
        }
        self.locks.uploads.release(&upload_id);
        debug!(
            bucket = %bucket.name, key = %upload.key, %upload_id, etag,
            parts = part_numbers.len(), "completed multipart upload"
        );

        Ok(CompletedUpload {
            object,
            etag,
            checksum: object_checksum,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_part_number(part_number: u16) -> StoreResult<()> {
    if part_number == 0 || part_number > MAX_PART_NUMBER {
        return Err(StoreError::InvalidPart { part_number });
    }
    Ok(())
}

fn part_path(dir: &Path, part_number: u16) -> PathBuf {
    dir.join(format!("{part_number}{PART_SUFFIX}"))
}

fn parse_part_number(path: &Path) -> Option<u16> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(PART_SUFFIX)?.parse().ok()
}

/// Validate the requested part numbers and map them to their files.
///
/// Part numbers must be strictly ascending and every named part must exist
/// on disk.
fn resolve_parts(dir: &Path, part_numbers: &[u16]) -> StoreResult<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(part_numbers.len());
    let mut previous = 0u16;
    for &number in part_numbers {
        validate_part_number(number)?;
        if number <= previous {
            return Err(StoreError::InvalidPart {
                part_number: number,
            });
        }
        previous = number;

        let path = part_path(dir, number);
        if !path.exists() {
            return Err(StoreError::InvalidPart {
                part_number: number,
            });
        }
        paths.push(path);
    }
    Ok(paths)
}

/// Compute and verify the whole-object checksum at completion.
fn assemble_checksum(
    algorithm: ChecksumAlgorithm,
    checksum_type: ChecksumType,
    upload: &MultipartUpload,
    part_numbers: &[u16],
    part_paths: &[PathBuf],
    supplied: Option<&str>,
) -> StoreResult<String> {
    let computed = match checksum_type {
        ChecksumType::Composite => {
            let mut part_checksums = Vec::with_capacity(part_numbers.len());
            for &number in part_numbers {
                let Some(checksum) = upload.part_checksums.get(&number) else {
                    return Err(StoreError::MissingPartChecksum {
                        algorithm,
                        part_number: number,
                    });
                };
                part_checksums.push(checksum.clone());
            }
            composite_checksum(algorithm, &part_checksums)
        }
        ChecksumType::FullObject => full_object_checksum(algorithm, part_paths)?,
    };

    if let Some(expected) = supplied {
        if expected != computed {
            return Err(StoreError::ChecksumMismatch {
                algorithm,
                expected: expected.to_owned(),
                computed,
            });
        }
    }
    Ok(computed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        bucket: BucketMetadata,
        objects: ObjectStore,
        store: MultipartStore,
    }

    fn make_fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let bucket = BucketMetadata::new(
            "b",
            "us-east-1",
            "BucketOwnerEnforced",
            false,
            None,
            dir.path().join("b"),
        );
        fs::create_dir_all(&bucket.path).expect("bucket dir");
        let locks = Arc::new(StoreLocks::new());
        let objects = ObjectStore::new(locks.clone());
        let store = MultipartStore::new(locks, objects.clone());
        Fixture {
            _dir: dir,
            bucket,
            objects,
            store,
        }
    }

    fn write_payload(fixture: &Fixture, name: &str, content: &[u8]) -> PathBuf {
        let path = fixture.bucket.path.join(name);
        fs::write(&path, content).expect("payload");
        path
    }

    fn create_upload(fixture: &Fixture) -> MultipartUpload {
        fixture
            .store
            .create_multipart_upload(
                &fixture.bucket,
                CreateMultipartUpload::builder().key("big.bin").build(),
            )
            .expect("create upload")
    }

    #[test]
    fn test_should_create_and_get_upload() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);
        assert!(fixture.store.locks.uploads.contains(&upload.upload_id));

        let loaded = fixture
            .store
            .get_multipart_upload(&fixture.bucket, upload.upload_id)
            .expect("get upload");
        assert_eq!(loaded.key, "big.bin");
        assert!(!loaded.completed);
    }

    #[test]
    fn test_should_fail_get_of_unknown_upload() {
        let fixture = make_fixture();
        let err = fixture
            .store
            .get_multipart_upload(&fixture.bucket, Uuid::new_v4())
            .expect_err("unknown upload");
        assert!(matches!(err, StoreError::NoSuchUpload { .. }));
    }

    #[test]
    fn test_should_store_and_list_parts() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);

        let p2 = write_payload(&fixture, "p2", b"bbbb");
        let p1 = write_payload(&fixture, "p1", b"aaa");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 2, &p2, None)
            .expect("part 2");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &p1, None)
            .expect("part 1");

        let parts = fixture
            .store
            .list_parts(&fixture.bucket, upload.upload_id)
            .expect("list parts");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_number, 1);
        assert_eq!(parts[0].size, 3);
        assert_eq!(parts[1].part_number, 2);
        assert_eq!(parts[1].size, 4);
    }

    #[test]
    fn test_should_reject_out_of_range_part_numbers() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);
        let payload = write_payload(&fixture, "p", b"x");

        for bad in [0u16, MAX_PART_NUMBER + 1] {
            let err = fixture
                .store
                .put_part(&fixture.bucket, upload.upload_id, bad, &payload, None)
                .expect_err("out of range");
            assert!(matches!(err, StoreError::InvalidPart { .. }));
        }
    }

    #[test]
    fn test_should_assemble_parts_with_multipart_etag() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);

        let p1 = write_payload(&fixture, "p1", b"hello ");
        let p2 = write_payload(&fixture, "p2", b"world");
        let e1 = fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &p1, None)
            .expect("part 1");
        let e2 = fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 2, &p2, None)
            .expect("part 2");

        let id = Uuid::new_v4();
        let completed = fixture
            .store
            .complete_multipart_upload(&fixture.bucket, id, upload.upload_id, &[1, 2], None)
            .expect("complete");

        assert_eq!(completed.etag, multipart_etag(&[e1, e2]));
        assert!(completed.etag.ends_with("-2"));
        assert_eq!(completed.object.size, 11);
        assert_eq!(
            fs::read(&completed.object.data_path).expect("payload"),
            b"hello world"
        );

        // Parts folder is gone and the upload's monitor released.
        assert!(!fixture.bucket.upload_path(upload.upload_id).exists());
        assert!(!fixture.store.locks.uploads.contains(&upload.upload_id));
    }

    #[test]
    fn test_should_reject_completion_with_missing_or_misordered_parts() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);
        let p1 = write_payload(&fixture, "p1", b"a");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &p1, None)
            .expect("part 1");

        let err = fixture
            .store
            .complete_multipart_upload(
                &fixture.bucket,
                Uuid::new_v4(),
                upload.upload_id,
                &[1, 3],
                None,
            )
            .expect_err("missing part");
        assert!(matches!(err, StoreError::InvalidPart { part_number: 3 }));

        let err = fixture
            .store
            .complete_multipart_upload(
                &fixture.bucket,
                Uuid::new_v4(),
                upload.upload_id,
                &[1, 1],
                None,
            )
            .expect_err("misordered parts");
        assert!(matches!(err, StoreError::InvalidPart { part_number: 1 }));
    }

    #[test]
    fn test_should_record_and_compose_part_checksums() {
        let fixture = make_fixture();
        let upload = fixture
            .store
            .create_multipart_upload(
                &fixture.bucket,
                CreateMultipartUpload::builder()
                    .key("sum.bin")
                    .checksum_algorithm(Some(ChecksumAlgorithm::Sha256))
                    .checksum_type(Some(ChecksumType::Composite))
                    .build(),
            )
            .expect("create upload");

        let p1 = write_payload(&fixture, "p1", b"one");
        let p2 = write_payload(&fixture, "p2", b"two");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &p1, None)
            .expect("part 1");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 2, &p2, None)
            .expect("part 2");

        let c1 = file_checksum(ChecksumAlgorithm::Sha256, &p1).expect("checksum 1");
        let c2 = file_checksum(ChecksumAlgorithm::Sha256, &p2).expect("checksum 2");
        let expected = composite_checksum(ChecksumAlgorithm::Sha256, &[c1, c2]);

        let completed = fixture
            .store
            .complete_multipart_upload(
                &fixture.bucket,
                Uuid::new_v4(),
                upload.upload_id,
                &[1, 2],
                Some(expected.as_str()),
            )
            .expect("complete");
        assert_eq!(completed.checksum.as_deref(), Some(expected.as_str()));
        assert!(expected.ends_with("-2"));
    }

    #[test]
    fn test_should_reject_mismatched_part_checksum() {
        let fixture = make_fixture();
        let upload = fixture
            .store
            .create_multipart_upload(
                &fixture.bucket,
                CreateMultipartUpload::builder()
                    .key("sum.bin")
                    .checksum_algorithm(Some(ChecksumAlgorithm::Crc32))
                    .build(),
            )
            .expect("create upload");
        let payload = write_payload(&fixture, "p", b"data");

        let err = fixture
            .store
            .put_part(
                &fixture.bucket,
                upload.upload_id,
                1,
                &payload,
                Some("AAAAAA=="),
            )
            .expect_err("bad checksum");
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_should_record_checksum_for_copied_part() {
        let fixture = make_fixture();
        let src = Uuid::new_v4();
        let source = write_payload(&fixture, "src", b"copied bytes");
        fixture
            .objects
            .store_object(
                &fixture.bucket,
                src,
                &source,
                PutObjectRequest::builder().key("src").build(),
            )
            .expect("store source");

        let upload = fixture
            .store
            .create_multipart_upload(
                &fixture.bucket,
                CreateMultipartUpload::builder()
                    .key("sum.bin")
                    .checksum_algorithm(Some(ChecksumAlgorithm::Sha256))
                    .checksum_type(Some(ChecksumType::Composite))
                    .build(),
            )
            .expect("create upload");
        fixture
            .store
            .copy_part(
                &fixture.bucket,
                src,
                None,
                None,
                &fixture.bucket,
                upload.upload_id,
                1,
            )
            .expect("copy part")
            .expect("present");

        // The copied part's checksum feeds the composite like an uploaded
        // part's would.
        let c1 = file_checksum(ChecksumAlgorithm::Sha256, &source).expect("checksum");
        let expected = composite_checksum(ChecksumAlgorithm::Sha256, &[c1]);
        let completed = fixture
            .store
            .complete_multipart_upload(
                &fixture.bucket,
                Uuid::new_v4(),
                upload.upload_id,
                &[1],
                None,
            )
            .expect("complete");
        assert_eq!(completed.checksum.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_should_keep_stored_part_when_rewrite_fails_verification() {
        let fixture = make_fixture();
        let upload = fixture
            .store
            .create_multipart_upload(
                &fixture.bucket,
                CreateMultipartUpload::builder()
                    .key("sum.bin")
                    .checksum_algorithm(Some(ChecksumAlgorithm::Crc32))
                    .checksum_type(Some(ChecksumType::Composite))
                    .build(),
            )
            .expect("create upload");

        let good = write_payload(&fixture, "good", b"keep me");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &good, None)
            .expect("part 1");

        let other = write_payload(&fixture, "other", b"reject me");
        let err = fixture
            .store
            .put_part(
                &fixture.bucket,
                upload.upload_id,
                1,
                &other,
                Some("AAAAAA=="),
            )
            .expect_err("bad checksum");
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));

        // The earlier part and its recorded checksum survive the rejection.
        let stored = part_path(&fixture.bucket.upload_path(upload.upload_id), 1);
        assert_eq!(fs::read(&stored).expect("part"), b"keep me");

        let c1 = file_checksum(ChecksumAlgorithm::Crc32, &good).expect("checksum");
        let expected = composite_checksum(ChecksumAlgorithm::Crc32, &[c1]);
        let completed = fixture
            .store
            .complete_multipart_upload(
                &fixture.bucket,
                Uuid::new_v4(),
                upload.upload_id,
                &[1],
                Some(expected.as_str()),
            )
            .expect("complete");
        assert_eq!(completed.checksum.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_should_abort_upload_and_release_lock() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);
        let payload = write_payload(&fixture, "p", b"x");
        fixture
            .store
            .put_part(&fixture.bucket, upload.upload_id, 1, &payload, None)
            .expect("part 1");

        assert!(
            fixture
                .store
                .abort_multipart_upload(&fixture.bucket, upload.upload_id)
                .expect("abort")
        );
        assert!(!fixture.bucket.upload_path(upload.upload_id).exists());
        assert!(!fixture.store.locks.uploads.contains(&upload.upload_id));

        // A second abort is a no-op.
        assert!(
            !fixture
                .store
                .abort_multipart_upload(&fixture.bucket, upload.upload_id)
                .expect("abort again")
        );
    }

    #[test]
    fn test_should_copy_whole_object_and_range_as_parts() {
        let fixture = make_fixture();
        let src = Uuid::new_v4();
        let source = write_payload(&fixture, "src", b"0123456789");
        fixture
            .objects
            .store_object(
                &fixture.bucket,
                src,
                &source,
                PutObjectRequest::builder().key("src").build(),
            )
            .expect("store source");

        let upload = create_upload(&fixture);
        fixture
            .store
            .copy_part(
                &fixture.bucket,
                src,
                None,
                None,
                &fixture.bucket,
                upload.upload_id,
                1,
            )
            .expect("copy whole")
            .expect("present");
        fixture
            .store
            .copy_part(
                &fixture.bucket,
                src,
                None,
                Some((2, 5)),
                &fixture.bucket,
                upload.upload_id,
                2,
            )
            .expect("copy range")
            .expect("present");

        let parts = fixture
            .store
            .list_parts(&fixture.bucket, upload.upload_id)
            .expect("list parts");
        assert_eq!(parts[0].size, 10);
        assert_eq!(parts[1].size, 4);

        let range_path = fixture
            .bucket
            .upload_path(upload.upload_id)
            .join(format!("2{PART_SUFFIX}"));
        assert_eq!(fs::read(range_path).expect("range part"), b"2345");
    }

    #[test]
    fn test_should_refuse_copy_part_into_unprepared_upload() {
        let fixture = make_fixture();
        let err = fixture
            .store
            .copy_part(
                &fixture.bucket,
                Uuid::new_v4(),
                None,
                None,
                &fixture.bucket,
                Uuid::new_v4(),
                1,
            )
            .expect_err("unprepared upload");
        assert!(matches!(err, StoreError::UploadNotPrepared { .. }));
    }

    #[test]
    fn test_should_report_missing_source_on_copy_part() {
        let fixture = make_fixture();
        let upload = create_upload(&fixture);
        let copied = fixture
            .store
            .copy_part(
                &fixture.bucket,
                Uuid::new_v4(),
                None,
                None,
                &fixture.bucket,
                upload.upload_id,
                1,
            )
            .expect("copy");
        assert!(copied.is_none());
    }

    #[test]
    fn test_should_list_uploads_by_prefix() {
        let fixture = make_fixture();
        for key in ["logs/a", "logs/b", "data/c"] {
            fixture
                .store
                .create_multipart_upload(
                    &fixture.bucket,
                    CreateMultipartUpload::builder().key(key).build(),
                )
                .expect("create upload");
        }

        let uploads = fixture
            .store
            .list_multipart_uploads(&fixture.bucket, Some("logs/"))
            .expect("list");
        let keys: Vec<_> = uploads.iter().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/a", "logs/b"]);

        assert_eq!(
            fixture
                .store
                .list_multipart_uploads(&fixture.bucket, None)
                .expect("list all")
                .len(),
            3
        );
    }
}
