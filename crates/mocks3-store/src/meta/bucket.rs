//! Bucket metadata and configuration types.
//!
//! A [`BucketMetadata`] value is persisted as one JSON file at the bucket
//! root and carries the bucket's configuration plus its key→identifier
//! index. The index's key set equals the set of live keys; each key maps to
//! exactly one identifier, stable across overwrites and versions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Bucket versioning status. Absence of a configuration means versioning
/// was never touched on the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    /// Versioning is currently enabled.
    Enabled,
    /// Versioning was previously enabled but is now suspended.
    Suspended,
}

// ---------------------------------------------------------------------------
// Object Lock
// ---------------------------------------------------------------------------

/// Object Lock configuration for a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLockConfiguration {
    /// Whether object lock is enabled (`Enabled`).
    pub object_lock_enabled: String,
    /// Optional default retention rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<ObjectLockRule>,
}

impl ObjectLockConfiguration {
    /// A configuration with lock enabled and no default retention.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            object_lock_enabled: "Enabled".to_owned(),
            rule: None,
        }
    }
}

/// A default retention rule within an Object Lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLockRule {
    /// The default retention settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_retention: Option<DefaultRetention>,
}

/// Default retention settings for Object Lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultRetention {
    /// The retention mode (`GOVERNANCE` or `COMPLIANCE`).
    pub mode: String,
    /// Number of days to retain the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,
    /// Number of years to retain the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years: Option<i32>,
}

// ---------------------------------------------------------------------------
// BucketMetadata
// ---------------------------------------------------------------------------

/// Persisted per-bucket state: configuration and the key→identifier index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketMetadata {
    /// Bucket name (unique, immutable).
    pub name: String,
    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
    /// Versioning status; `None` when never configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versioning: Option<VersioningStatus>,
    /// Object Lock configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_lock_configuration: Option<ObjectLockConfiguration>,
    /// Lifecycle configuration, stored as opaque JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_configuration: Option<serde_json::Value>,
    /// Region recorded at creation.
    pub bucket_region: String,
    /// Object ownership setting (e.g. `BucketOwnerEnforced`).
    pub ownership: String,
    /// Additional bucket info supplied at creation, stored as opaque JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_info: Option<serde_json::Value>,
    /// Storage root folder of this bucket.
    pub path: PathBuf,
    /// Key→identifier index. Sorted map, but callers get no ordering
    /// guarantee beyond index iteration order.
    #[serde(default)]
    pub objects: BTreeMap<String, Uuid>,
}

impl BucketMetadata {
    /// Create metadata for a new bucket with an empty key index.
    #[must_use]
    pub fn new(
        name: &str,
        region: &str,
        ownership: &str,
        object_lock_enabled: bool,
        bucket_info: Option<serde_json::Value>,
        path: PathBuf,
    ) -> Self {
        Self {
            name: name.to_owned(),
            creation_date: Utc::now(),
            versioning: None,
            object_lock_configuration: object_lock_enabled.then(ObjectLockConfiguration::enabled),
            lifecycle_configuration: None,
            bucket_region: region.to_owned(),
            ownership: ownership.to_owned(),
            bucket_info,
            path,
            objects: BTreeMap::new(),
        }
    }

    /// Whether versioning is currently enabled.
    ///
    /// Suspended versioning behaves like disabled for new writes: only
    /// `Enabled` mints version identifiers.
    #[must_use]
    pub fn is_versioning_enabled(&self) -> bool {
        self.versioning == Some(VersioningStatus::Enabled)
    }

    /// The storage folder of an object identifier within this bucket.
    #[must_use]
    pub fn object_path(&self, id: Uuid) -> PathBuf {
        self.path.join(id.to_string())
    }

    /// The folder holding this bucket's in-flight multipart uploads.
    #[must_use]
    pub fn multiparts_path(&self) -> PathBuf {
        self.path.join(crate::store::MULTIPARTS_DIR)
    }

    /// The parts folder of one multipart upload.
    #[must_use]
    pub fn upload_path(&self, upload_id: Uuid) -> PathBuf {
        self.multiparts_path().join(upload_id.to_string())
    }

    /// Identifiers of all keys starting with `prefix` (all keys when `None`).
    #[must_use]
    pub fn matching_ids(&self, prefix: Option<&str>) -> Vec<Uuid> {
        self.objects
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(_, id)| *id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
