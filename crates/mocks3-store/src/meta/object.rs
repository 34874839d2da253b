//! Object metadata, access control, and version-chain records.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;

// ---------------------------------------------------------------------------
// Ownership and access control
// ---------------------------------------------------------------------------

/// The canonical owner recorded on every object and upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    /// Canonical user identifier.
    pub id: String,
    /// Display name.
    pub display_name: String,
}

impl Default for Owner {
    fn default() -> Self {
        Self {
            id: "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a".to_owned(),
            display_name: "webfile".to_owned(),
        }
    }
}

/// A permission granted to a grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Full control over the object.
    FullControl,
    /// Read the object data and metadata.
    Read,
    /// Read the object's ACL.
    ReadAcp,
    /// Write to the object.
    Write,
    /// Modify the object's ACL.
    WriteAcp,
}

/// The party a permission is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Grantee {
    /// A canonical account user.
    #[serde(rename_all = "camelCase")]
    CanonicalUser {
        /// Canonical user identifier.
        id: String,
        /// Display name.
        display_name: String,
    },
    /// A predefined group, identified by URI.
    #[serde(rename_all = "camelCase")]
    Group {
        /// Group URI.
        uri: String,
    },
}

/// One grant within an access control policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Who the grant applies to.
    pub grantee: Grantee,
    /// What the grantee may do.
    pub permission: Permission,
}

/// An object's access control policy: owner plus grant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicy {
    /// The object owner.
    pub owner: Owner,
    /// The grants attached to the object.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl AccessControlPolicy {
    /// A private policy: the owner holds full control, nothing else.
    #[must_use]
    pub fn private(owner: Owner) -> Self {
        let grantee = Grantee::CanonicalUser {
            id: owner.id.clone(),
            display_name: owner.display_name.clone(),
        };
        Self {
            owner,
            grants: vec![Grant {
                grantee,
                permission: Permission::FullControl,
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Tagging and retention
// ---------------------------------------------------------------------------

/// A single object tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Legal hold status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegalHoldStatus {
    /// Hold is active.
    On,
    /// Hold is inactive.
    Off,
}

/// An object's legal hold record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegalHold {
    /// The hold status.
    pub status: LegalHoldStatus,
}

/// Object retention modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetentionMode {
    /// Retention that privileged callers may shorten.
    Governance,
    /// Retention that cannot be shortened.
    Compliance,
}

/// An object's retention record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    /// The retention mode.
    pub mode: RetentionMode,
    /// When the retention expires.
    pub retain_until_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ObjectMeta
// ---------------------------------------------------------------------------

/// Persisted per-object (or per-version) metadata.
///
/// The payload lives in a sibling file referenced by `data_path`; this record
/// holds everything else, including the protocol and encryption headers the
/// caller asked the store to carry verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Stable object identifier, shared by all versions of one key.
    pub id: Uuid,
    /// The key this object is stored under.
    pub key: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Payload ETag, unquoted hex (with a `-{n}` suffix for multipart).
    pub etag: String,
    /// Content type recorded at write time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// When this record was written.
    pub modification_date: DateTime<Utc>,
    /// Location of the payload file.
    pub data_path: PathBuf,
    /// Caller-supplied user metadata, carried verbatim.
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    /// Object tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Legal hold, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_hold: Option<LegalHold>,
    /// Retention, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<Retention>,
    /// The object owner.
    pub owner: Owner,
    /// Protocol headers carried verbatim for replay on reads.
    #[serde(default)]
    pub store_headers: HashMap<String, String>,
    /// Encryption headers carried verbatim; the KMS key id among them salts
    /// the payload digest.
    #[serde(default)]
    pub encryption_headers: HashMap<String, String>,
    /// Recorded payload checksum (base64, composite suffix when multipart).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Algorithm the recorded checksum was computed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// Storage class recorded at write time.
    pub storage_class: String,
    /// Version identifier, when the bucket versioned this write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    /// Whether this record is a delete marker rather than a payload.
    #[serde(default)]
    pub delete_marker: bool,
    /// Access control policy, when one was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<AccessControlPolicy>,
}

// ---------------------------------------------------------------------------
// VersionChain
// ---------------------------------------------------------------------------

/// The ordered version history of one object identifier.
///
/// Versions are kept in a sorted map from a monotonically increasing
/// sequence number to the minted version identifier, so the latest version
/// is always the entry with the highest sequence, even after arbitrary
/// deletions in the middle of the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionChain {
    /// The object identifier this chain belongs to.
    pub id: Uuid,
    /// Sequence→version-identifier map.
    #[serde(default)]
    pub versions: BTreeMap<u64, String>,
    /// The highest sequence ever assigned. Never reused.
    #[serde(default)]
    pub counter: u64,
}

impl VersionChain {
    /// Create an empty chain for `id`.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            versions: BTreeMap::new(),
            counter: 0,
        }
    }

    /// Mint a new version identifier and append it to the chain.
    pub fn create_version(&mut self) -> String {
        self.counter += 1;
        let version_id = Uuid::new_v4().simple().to_string();
        self.versions.insert(self.counter, version_id.clone());
        version_id
    }

    /// The most recently minted version still in the chain.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.versions.last_key_value().map(|(_, v)| v.as_str())
    }

    /// Remove one version from the chain. Returns whether it was present.
    pub fn remove_version(&mut self, version_id: &str) -> bool {
        let seq = self
            .versions
            .iter()
            .find(|(_, v)| v.as_str() == version_id)
            .map(|(seq, _)| *seq);
        match seq {
            Some(seq) => self.versions.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Whether the chain holds no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Version identifiers from newest to oldest.
    #[must_use]
    pub fn newest_first(&self) -> Vec<&str> {
        self.versions.values().rev().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
