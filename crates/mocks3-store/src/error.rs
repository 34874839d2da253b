//! Storage-engine error types.
//!
//! Defines [`StoreError`], the error vocabulary the protocol layer maps onto
//! wire responses. "Not found" is deliberately absent from this enum: lookups
//! return `Ok(None)` / `Ok(false)` so callers can treat absence as a
//! first-class result rather than a failure.
//!
//! Local storage failures always carry the offending path; nothing in this
//! layer retries.

use std::path::PathBuf;

use crate::checksums::ChecksumAlgorithm;

/// Storage-engine error type.
///
/// Variants fall into three groups: caller-contract violations (unknown
/// upload, unprepared upload, no-op same-key copy, missing part), checksum
/// failures, and local storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Caller-contract violations
    // -----------------------------------------------------------------------
    /// The bucket already exists and cannot be created again.
    #[error("bucket already exists: {bucket}")]
    BucketAlreadyExists {
        /// The conflicting bucket name.
        bucket: String,
    },

    /// The multipart upload is unknown (never created, aborted, or completed).
    #[error("no such multipart upload: {upload_id}")]
    NoSuchUpload {
        /// The upload identifier that was not found.
        upload_id: String,
    },

    /// A part copy was attempted before the upload's parts folder existed.
    #[error("multipart upload was not prepared: {upload_id}")]
    UploadNotPrepared {
        /// The upload identifier whose parts folder is missing.
        upload_id: String,
    },

    /// A copy onto the same bucket/key without any metadata change.
    #[error("copy of {bucket}/{key} onto itself requires changed metadata")]
    InvalidCopy {
        /// The bucket of the rejected copy.
        bucket: String,
        /// The key of the rejected copy.
        key: String,
    },

    /// A part referenced at completion has no stored part file.
    #[error("part {part_number} was not found for this upload")]
    InvalidPart {
        /// The offending part number.
        part_number: u16,
    },

    // -----------------------------------------------------------------------
    // Checksum failures
    // -----------------------------------------------------------------------
    /// A completed part carries no checksum for the declared algorithm.
    #[error("part {part_number} is missing a {algorithm} checksum")]
    MissingPartChecksum {
        /// The algorithm declared at upload initiation.
        algorithm: ChecksumAlgorithm,
        /// The offending part number.
        part_number: u16,
    },

    /// The supplied whole-object checksum does not match the combined value.
    #[error("{algorithm} checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        /// The algorithm declared at upload initiation.
        algorithm: ChecksumAlgorithm,
        /// The checksum supplied by the caller.
        expected: String,
        /// The checksum computed from the stored parts.
        computed: String,
    },

    // -----------------------------------------------------------------------
    // Local storage failures
    // -----------------------------------------------------------------------
    /// An I/O failure reading or writing a payload, metadata, or index file.
    #[error("storage I/O failure at {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A metadata file could not be encoded or decoded.
    #[error("invalid metadata at {path}: {source}")]
    Metadata {
        /// The metadata file involved.
        path: PathBuf,
        /// The underlying serialization error.
        source: serde_json::Error,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// Build an [`StoreError::Io`] carrying the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an [`StoreError::Metadata`] carrying the offending path.
    pub fn metadata(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Metadata {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for storage-engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_bucket_conflict() {
        let err = StoreError::BucketAlreadyExists {
            bucket: "taken".to_owned(),
        };
        assert_eq!(err.to_string(), "bucket already exists: taken");
    }

    #[test]
    fn test_should_carry_path_in_io_error() {
        let err = StoreError::io(
            "/data/b1/bucket.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("/data/b1/bucket.json"));
        assert!(rendered.contains("denied"));
    }

    #[test]
    fn test_should_name_algorithm_in_checksum_errors() {
        let err = StoreError::MissingPartChecksum {
            algorithm: ChecksumAlgorithm::Sha256,
            part_number: 3,
        };
        assert!(err.to_string().contains("SHA256"));
        assert!(err.to_string().contains('3'));

        let err = StoreError::ChecksumMismatch {
            algorithm: ChecksumAlgorithm::Crc32,
            expected: "AAAA".to_owned(),
            computed: "BBBB".to_owned(),
        };
        assert!(err.to_string().contains("CRC32"));
        assert!(err.to_string().contains("AAAA"));
    }

    #[test]
    fn test_should_wrap_internal_context() {
        let err = StoreError::Internal(anyhow::anyhow!("bucket index out of sync"));
        assert!(err.to_string().contains("out of sync"));
    }
}
