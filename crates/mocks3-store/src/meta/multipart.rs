//! Multipart upload records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, ChecksumType};

use super::object::{Owner, Tag};

/// Persisted state of one multipart upload.
///
/// Written when the upload is created and updated as parts arrive; the final
/// object's metadata is derived from this record at completion. Part
/// payloads live as numbered files next to it in the upload folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    /// Upload identifier.
    pub upload_id: Uuid,
    /// Bucket the upload targets.
    pub bucket: String,
    /// Key the assembled object will be stored under.
    pub key: String,
    /// When the upload was created.
    pub initiated: DateTime<Utc>,
    /// Owner the assembled object will carry.
    pub owner: Owner,
    /// Who initiated the upload.
    pub initiator: Owner,
    /// Storage class of the assembled object.
    pub storage_class: String,
    /// Checksum algorithm declared at creation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// How a declared checksum spans the parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<ChecksumType>,
    /// Content type of the assembled object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Protocol headers carried through to the assembled object.
    #[serde(default)]
    pub store_headers: HashMap<String, String>,
    /// User metadata carried through to the assembled object.
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
    /// Encryption headers carried through to the assembled object.
    #[serde(default)]
    pub encryption_headers: HashMap<String, String>,
    /// Tags carried through to the assembled object.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Set once completion succeeds, so a late abort knows not to delete
    /// anything.
    #[serde(default)]
    pub completed: bool,
    /// Per-part checksums recorded at part upload, keyed by part number.
    /// Only populated when `checksum_algorithm` is declared.
    #[serde(default)]
    pub part_checksums: BTreeMap<u16, String>,
}

/// One uploaded part, as reported by a part listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPart {
    /// Part number (1..=10000).
    pub part_number: u16,
    /// Unquoted hex digest of the part payload.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
    /// When the part file was last written.
    pub last_modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_upload() -> MultipartUpload {
        MultipartUpload {
            upload_id: Uuid::new_v4(),
            bucket: "b".to_owned(),
            key: "k".to_owned(),
            initiated: Utc::now(),
            owner: Owner::default(),
            initiator: Owner::default(),
            storage_class: "STANDARD".to_owned(),
            checksum_algorithm: Some(ChecksumAlgorithm::Sha256),
            checksum_type: Some(ChecksumType::Composite),
            content_type: None,
            store_headers: HashMap::new(),
            user_metadata: HashMap::new(),
            encryption_headers: HashMap::new(),
            tags: Vec::new(),
            completed: false,
            part_checksums: BTreeMap::new(),
        }
    }

    #[test]
    fn test_should_roundtrip_upload_through_json() {
        let mut upload = make_upload();
        upload.part_checksums.insert(2, "abc=".to_owned());
        upload.part_checksums.insert(1, "def=".to_owned());

        let json = serde_json::to_string(&upload).expect("serialize");
        assert!(json.contains("uploadId"));
        assert!(json.contains("checksumAlgorithm"));

        let decoded: MultipartUpload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded.upload_id, upload.upload_id);
        assert!(!decoded.completed);
        // BTreeMap keeps part order by number.
        let keys: Vec<_> = decoded.part_checksums.keys().copied().collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn test_should_default_missing_collections() {
        let json = format!(
            r#"{{"uploadId":"{}","bucket":"b","key":"k","initiated":"2026-01-01T00:00:00Z",
                "owner":{{"id":"x","displayName":"y"}},
                "initiator":{{"id":"x","displayName":"y"}},
                "storageClass":"STANDARD"}}"#,
            Uuid::new_v4()
        );
        let decoded: MultipartUpload = serde_json::from_str(&json).expect("deserialize");
        assert!(decoded.part_checksums.is_empty());
        assert!(decoded.tags.is_empty());
        assert!(decoded.checksum_algorithm.is_none());
    }
}
