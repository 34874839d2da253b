//! Persisted metadata records.
//!
//! Every type in this module is a plain serde value written as a JSON file
//! under the storage root. Mutations are copy-on-write: the owning store
//! loads the file, replaces the value, and rewrites the whole file under the
//! entity's monitor.

pub mod bucket;
pub mod multipart;
pub mod object;

pub use bucket::{BucketMetadata, ObjectLockConfiguration, VersioningStatus};
pub use multipart::{MultipartUpload, StoredPart};
pub use object::{
    AccessControlPolicy, Grant, Grantee, LegalHold, LegalHoldStatus, ObjectMeta, Owner, Permission,
    Retention, RetentionMode, Tag, VersionChain,
};
